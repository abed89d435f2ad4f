//! Span patching over an untouched original.
//!
//! Edits are recorded against byte offsets of the original text and applied in
//! a single forward pass, so everything outside an edit is copied verbatim.
//! The same pass emits a version-3 source map back to the original.

use sourcemap::SourceMapBuilder;

use crate::error::PluginResult;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Replacement {
    start: u32,
    end: u32,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutput {
    pub code: String,
    pub map: String,
}

#[derive(Debug)]
pub struct SourcePatch<'a> {
    original: &'a str,
    prefix: String,
    replacements: Vec<Replacement>,
}

impl<'a> SourcePatch<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            prefix: String::new(),
            replacements: Vec::new(),
        }
    }

    pub fn prepend(&mut self, text: &str) {
        self.prefix.insert_str(0, text);
    }

    /// Replace `start..end` of the original. Replacements that would not change
    /// the text are dropped.
    pub fn overwrite(&mut self, start: u32, end: u32, text: impl Into<String>) {
        let text = text.into();
        if self.original.get(start as usize..end as usize) == Some(text.as_str()) {
            return;
        }
        self.replacements.push(Replacement { start, end, text });
    }

    pub fn replacement_count(&self) -> usize {
        self.replacements.len()
    }

    /// Apply every edit. `source_name` becomes the map's only source.
    pub fn finish(mut self, source_name: &str) -> PluginResult<PatchOutput> {
        self.replacements.sort_by(|a, b| a.start.cmp(&b.start));

        let mut builder = SourceMapBuilder::new(Some(source_name));
        let source_id = builder.add_source(source_name);
        builder.set_source_contents(source_id, Some(self.original));

        let mut code = String::with_capacity(self.prefix.len() + self.original.len());
        let mut generated = Cursor::default();
        let mut original = Cursor::default();

        code.push_str(&self.prefix);
        generated.advance(&self.prefix);

        let mut pos = 0usize;
        for replacement in &self.replacements {
            let start = replacement.start as usize;
            let end = replacement.end as usize;
            if start < pos || end > self.original.len() || start > end {
                log::debug!(
                    "dropping overlapping edit {}..{} in {}",
                    start,
                    end,
                    source_name
                );
                continue;
            }

            let unchanged = &self.original[pos..start];
            copy_mapped(&mut builder, source_id, unchanged, &mut generated, &mut original);
            code.push_str(unchanged);

            builder.add_raw(
                generated.line,
                generated.column,
                original.line,
                original.column,
                Some(source_id),
                None,
                false,
            );
            code.push_str(&replacement.text);
            generated.advance(&replacement.text);
            original.advance(&self.original[start..end]);
            pos = end;
        }

        let rest = &self.original[pos..];
        copy_mapped(&mut builder, source_id, rest, &mut generated, &mut original);
        code.push_str(rest);

        let mut map = Vec::new();
        builder.into_sourcemap().to_writer(&mut map)?;

        Ok(PatchOutput {
            code,
            map: String::from_utf8_lossy(&map).into_owned(),
        })
    }
}

/// Line and UTF-16 column, both 0-based, as source maps count them.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    line: u32,
    column: u32,
}

impl Cursor {
    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += ch.len_utf16() as u32;
            }
        }
    }
}

/// Copy an unchanged run, mapping its start and every line start inside it.
fn copy_mapped(
    builder: &mut SourceMapBuilder,
    source_id: u32,
    text: &str,
    generated: &mut Cursor,
    original: &mut Cursor,
) {
    for line in text.split_inclusive('\n') {
        builder.add_raw(
            generated.line,
            generated.column,
            original.line,
            original.column,
            Some(source_id),
            None,
            false,
        );
        generated.advance(line);
        original.advance(line);
    }
}
