//! Specifier discovery over a parsed ES module.

use crate::error::ParseError;
use std::path::Path;
use swc_common::{sync::Lrc, BytePos, FileName, SourceMap, Spanned};
use swc_ecma_ast::{CallExpr, Callee, EsVersion, ExportAll, Expr, ImportDecl, Lit, NamedExport, Str};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax};
use swc_ecma_visit::{Visit, VisitWith};

/// The statement kinds that carry a module specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// `import x from 'a'`, `import { x } from 'a'`, `import * as x from 'a'`, `import 'a'`
    Import,
    /// `export { x } from 'a'`, `export * as x from 'a'`
    ReExport,
    /// `export * from 'a'`
    ExportAll,
    /// `import('a')` with a string literal argument
    DynamicImport,
}

/// A located specifier string literal.
///
/// `start..end` are byte offsets into the original source and cover the
/// literal including its quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierRef {
    pub kind: SpecifierKind,
    pub start: usize,
    pub end: usize,
    /// Decoded literal value.
    pub specifier: String,
}

/// Parse `source` as an ES module and collect every specifier reference.
///
/// References are returned in document order. A leading byte order mark
/// is not parsed; offsets still index into `source` including it.
pub fn scan_specifiers(path: &Path, source: &str) -> Result<Vec<SpecifierRef>, ParseError> {
    let body = source.strip_prefix('\u{feff}').unwrap_or(source);
    let bom_len = source.len() - body.len();

    let cm: Lrc<SourceMap> = Lrc::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Real(path.to_path_buf())),
        body.to_string(),
    );

    let syntax = EsSyntax {
        import_attributes: true,
        ..EsSyntax::default()
    };
    let lexer = Lexer::new(
        Syntax::Es(syntax),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let module = parser
        .parse_module()
        .map_err(|e| parse_error(path, body, fm.start_pos, e.span().lo, &e.kind().msg()))?;

    // Recoverable errors still mean the module is invalid for the browser.
    if let Some(e) = parser.take_errors().into_iter().next() {
        return Err(parse_error(
            path,
            body,
            fm.start_pos,
            e.span().lo,
            &e.kind().msg(),
        ));
    }

    let mut collector = SpecifierCollector {
        base: fm.start_pos,
        shift: bom_len,
        refs: Vec::new(),
    };
    module.visit_with(&mut collector);

    let mut refs = collector.refs;
    refs.sort_by_key(|r| r.start);
    Ok(refs)
}

fn parse_error(path: &Path, source: &str, base: BytePos, at: BytePos, message: &str) -> ParseError {
    let offset = (at.0.saturating_sub(base.0) as usize).min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count());

    ParseError {
        path: path.to_path_buf(),
        message: message.to_string(),
        line,
        column,
    }
}

struct SpecifierCollector {
    base: BytePos,
    shift: usize,
    refs: Vec<SpecifierRef>,
}

impl SpecifierCollector {
    fn push(&mut self, kind: SpecifierKind, src: &Str) {
        self.refs.push(SpecifierRef {
            kind,
            start: self.shift + src.span.lo.0.saturating_sub(self.base.0) as usize,
            end: self.shift + src.span.hi.0.saturating_sub(self.base.0) as usize,
            specifier: src.value.to_string(),
        });
    }
}

impl Visit for SpecifierCollector {
    fn visit_import_decl(&mut self, n: &ImportDecl) {
        self.push(SpecifierKind::Import, &n.src);
    }

    fn visit_named_export(&mut self, n: &NamedExport) {
        if let Some(src) = &n.src {
            self.push(SpecifierKind::ReExport, src);
        }
    }

    fn visit_export_all(&mut self, n: &ExportAll) {
        self.push(SpecifierKind::ExportAll, &n.src);
    }

    fn visit_call_expr(&mut self, n: &CallExpr) {
        if let Callee::Import(_) = n.callee {
            if let Some(arg) = n.args.first() {
                if let Expr::Lit(Lit::Str(src)) = &*arg.expr {
                    self.push(SpecifierKind::DynamicImport, src);
                }
            }
        }
        n.visit_children_with(self);
    }
}
