//! Component source rewriting.
//!
//! Injects the style import and rewrites statically known class names in JSX
//! attributes. The source is never re-emitted: the visitors only collect
//! `(start, end, text)` replacements which are patched onto the original.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::path::Path;

use crate::compile::ScopeManifest;
use crate::error::{PluginError, PluginResult};
use crate::patch::{PatchOutput, SourcePatch};

pub type RewriteOutput = PatchOutput;

/// The side-effect import prepended to every transformed component.
pub fn style_import_line(virtual_id: &str) -> String {
    format!("import {};\n", quote_js(virtual_id))
}

/// Rewrite one component module. `id` is the host module id; it names the
/// source in the returned map and picks the parser's source type.
pub fn rewrite_component(
    source: &str,
    id: &str,
    manifest: &ScopeManifest,
    style_import_id: &str,
) -> PluginResult<RewriteOutput> {
    let mut patch = SourcePatch::new(source);

    let import_line = style_import_line(style_import_id);
    if !source.starts_with(&import_line) {
        patch.prepend(&import_line);
    }

    if manifest.is_empty() {
        return patch.finish(id);
    }

    for (start, end, text) in collect_class_rewrites(source, id, manifest)? {
        patch.overwrite(start, end, text);
    }
    log::debug!("{}: {} class rewrites", id, patch.replacement_count());

    patch.finish(id)
}

/// Parse `source` and collect the class-name replacements for `manifest`.
pub fn collect_class_rewrites(
    source: &str,
    id: &str,
    manifest: &ScopeManifest,
) -> PluginResult<Vec<(u32, u32, String)>> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(id)).parse();
    if !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PluginError::ComponentParse {
            id: id.to_string(),
            message,
        });
    }

    let mut rewriter = ClassAttributeRewriter::new(source, manifest);
    rewriter.visit_program(&ret.program);
    Ok(rewriter.replacements)
}

fn source_type_for(id: &str) -> SourceType {
    let path = id.trim_start_matches('\0');
    let path = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
    SourceType::from_path(Path::new(path)).unwrap_or_else(|_| SourceType::tsx())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassAttribute {
    Class,
    ClassList,
}

impl ClassAttribute {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "class" | "className" => Some(ClassAttribute::Class),
            "classList" => Some(ClassAttribute::ClassList),
            _ => None,
        }
    }
}

/// `class="a b"` is raw JSX text, `class={"a b"}` a JavaScript string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Jsx,
    Js,
}

/// The closed set of attribute value shapes the rewriter distinguishes.
enum AttributeValue<'b, 'a> {
    StringLiteral(&'b StringLiteral<'a>, Quoting),
    CallWithArgs(&'b CallExpression<'a>),
    ObjectLiteral(&'b ObjectExpression<'a>),
    ArrayLiteral(&'b ArrayExpression<'a>),
    Other,
}

impl<'b, 'a> AttributeValue<'b, 'a> {
    fn classify(value: &'b JSXAttributeValue<'a>) -> Self {
        match value {
            JSXAttributeValue::StringLiteral(lit) => AttributeValue::StringLiteral(lit, Quoting::Jsx),
            JSXAttributeValue::ExpressionContainer(container) => match &container.expression {
                JSXExpression::StringLiteral(lit) => AttributeValue::StringLiteral(lit, Quoting::Js),
                JSXExpression::CallExpression(call) if !call.arguments.is_empty() => {
                    AttributeValue::CallWithArgs(call)
                }
                JSXExpression::ObjectExpression(obj) => AttributeValue::ObjectLiteral(obj),
                JSXExpression::ArrayExpression(arr) => AttributeValue::ArrayLiteral(arr),
                _ => AttributeValue::Other,
            },
            _ => AttributeValue::Other,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISITORS
// ═══════════════════════════════════════════════════════════════════════════════

struct ClassAttributeRewriter<'s> {
    source: &'s str,
    manifest: &'s ScopeManifest,
    replacements: Vec<(u32, u32, String)>,
}

impl<'s> ClassAttributeRewriter<'s> {
    fn new(source: &'s str, manifest: &'s ScopeManifest) -> Self {
        Self {
            source,
            manifest,
            replacements: Vec::new(),
        }
    }

    fn rewrite_attribute(&mut self, kind: ClassAttribute, value: AttributeValue<'_, '_>) {
        match (kind, value) {
            (ClassAttribute::Class, AttributeValue::StringLiteral(lit, Quoting::Jsx)) => {
                self.rewrite_jsx_string(lit);
            }
            (ClassAttribute::Class, AttributeValue::StringLiteral(lit, Quoting::Js)) => {
                if let Some(text) = rewrite_js_string(lit, self.manifest) {
                    self.replacements.push((lit.span.start, lit.span.end, text));
                }
            }
            (ClassAttribute::Class, AttributeValue::CallWithArgs(call)) => {
                let mut keys = ClassKeyRewriter::new(self.manifest);
                for argument in &call.arguments {
                    keys.visit_argument(argument);
                }
                self.replacements.append(&mut keys.replacements);
            }
            (ClassAttribute::Class, AttributeValue::ArrayLiteral(arr)) => {
                let mut keys = ClassKeyRewriter::new(self.manifest);
                keys.visit_array_expression(arr);
                self.replacements.append(&mut keys.replacements);
            }
            (ClassAttribute::ClassList, AttributeValue::ObjectLiteral(obj)) => {
                let mut keys = ClassKeyRewriter::new(self.manifest);
                keys.visit_object_expression(obj);
                self.replacements.append(&mut keys.replacements);
            }
            // Computed values cannot be resolved statically.
            _ => {}
        }
    }

    /// JSX attribute strings carry no escapes, so the raw text between the
    /// quotes is the class list.
    fn rewrite_jsx_string(&mut self, lit: &StringLiteral<'_>) {
        let (start, end) = (lit.span.start as usize, lit.span.end as usize);
        if end < start + 2 {
            return;
        }
        let Some(raw) = self.source.get(start + 1..end - 1) else {
            return;
        };
        let rewritten = rewrite_tokens(raw, self.manifest);
        if rewritten == raw {
            return;
        }
        let quote = if rewritten.contains('"') { '\'' } else { '"' };
        self.replacements.push((
            lit.span.start,
            lit.span.end,
            format!("{quote}{rewritten}{quote}"),
        ));
    }
}

impl<'a> Visit<'a> for ClassAttributeRewriter<'_> {
    fn visit_jsx_attribute(&mut self, attr: &JSXAttribute<'a>) {
        if let (JSXAttributeName::Identifier(name), Some(value)) = (&attr.name, &attr.value) {
            if let Some(kind) = ClassAttribute::from_name(name.name.as_str()) {
                self.rewrite_attribute(kind, AttributeValue::classify(value));
            }
        }
        walk::walk_jsx_attribute(self, attr);
    }
}

/// Rewrites object keys and array string members inside a class expression.
struct ClassKeyRewriter<'m> {
    manifest: &'m ScopeManifest,
    replacements: Vec<(u32, u32, String)>,
}

impl<'m> ClassKeyRewriter<'m> {
    fn new(manifest: &'m ScopeManifest) -> Self {
        Self {
            manifest,
            replacements: Vec::new(),
        }
    }

    fn lookup<'k>(&self, name: &'k str) -> &'k str
    where
        'm: 'k,
    {
        self.manifest.get(name).map(String::as_str).unwrap_or(name)
    }
}

impl<'a> Visit<'a> for ClassKeyRewriter<'_> {
    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.method || prop.computed || prop.kind != PropertyKind::Init {
            return;
        }
        match &prop.key {
            PropertyKey::StaticIdentifier(ident) => {
                let name = ident.name.as_str();
                let key = quote_js(self.lookup(name));
                let text = if prop.shorthand {
                    format!("{key}: {name}")
                } else {
                    key
                };
                self.replacements.push((ident.span.start, ident.span.end, text));
            }
            PropertyKey::StringLiteral(lit) => {
                if let Some(text) = rewrite_js_string(lit, self.manifest) {
                    self.replacements.push((lit.span.start, lit.span.end, text));
                }
            }
            _ => {}
        }
        if !prop.shorthand {
            self.visit_expression(&prop.value);
        }
    }

    fn visit_array_expression_element(&mut self, element: &ArrayExpressionElement<'a>) {
        if let ArrayExpressionElement::StringLiteral(lit) = element {
            if let Some(text) = rewrite_js_string(lit, self.manifest) {
                self.replacements.push((lit.span.start, lit.span.end, text));
            }
            return;
        }
        walk::walk_array_expression_element(self, element);
    }

    // Nested markup belongs to the attribute visitor.
    fn visit_jsx_element(&mut self, _element: &JSXElement<'a>) {}

    fn visit_jsx_fragment(&mut self, _fragment: &JSXFragment<'a>) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Split on whitespace, map each token through the manifest, rejoin with
/// single spaces.
pub fn rewrite_tokens(value: &str, manifest: &ScopeManifest) -> String {
    value
        .split_whitespace()
        .map(|token| manifest.get(token).map(String::as_str).unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn rewrite_js_string(lit: &StringLiteral<'_>, manifest: &ScopeManifest) -> Option<String> {
    let value = lit.value.as_str();
    let rewritten = rewrite_tokens(value, manifest);
    (rewritten != value).then(|| quote_js(&rewritten))
}

/// Double-quoted JavaScript string literal.
pub fn quote_js(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
