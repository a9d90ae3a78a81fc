//! Validation and import/export discovery for module bytes.
//!
//! [`scan`] handles a complete buffer. [`StreamingScan`] accepts the module
//! in arbitrary chunks, validating each section (and each function body) as
//! soon as it is complete, so a malformed module fails before its tail has
//! even arrived.

use anyhow::{Context, bail};
use wasmparser::{
    Chunk, Export, ExportSectionReader, ExternalKind, Import, ImportSectionReader, Parser,
    Payload, TypeRef, ValidPayload, Validator,
};

use crate::Engine;
use crate::linker::Linker;

/// Kind of an imported or exported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDef {
    pub module: String,
    pub name: String,
    pub kind: ExternKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDef {
    pub name: String,
    pub kind: ExternKind,
}

/// What a module expects from, and offers to, the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiSummary {
    pub imports: Vec<ImportDef>,
    pub exports: Vec<ExportDef>,
}

impl AbiSummary {
    pub fn export(&self, name: &str) -> Option<ExternKind> {
        self.exports.iter().find(|e| e.name == name).map(|e| e.kind)
    }

    pub fn imports_from<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a ImportDef> + 'a {
        self.imports.iter().filter(move |i| i.module == module)
    }

    /// Imports the operation table cannot satisfy.
    pub fn missing_imports(&self, linker: &Linker) -> Vec<&ImportDef> {
        self.imports
            .iter()
            .filter(|i| !(i.kind == ExternKind::Func && i.module == linker.namespace() && linker.has(&i.name)))
            .collect()
    }
}

pub(crate) fn scan(engine: &Engine, bytes: &[u8]) -> Result<AbiSummary, anyhow::Error> {
    let mut validator = engine.new_validator();
    validator.validate_all(bytes)?;

    let mut builder = AbiBuilder::default();
    for payload in Parser::new(0).parse_all(bytes) {
        builder.process_payload(&payload?)?;
    }
    Ok(builder.build())
}

/// Incremental validator fed one chunk at a time.
pub struct StreamingScan {
    parser: Parser,
    validator: Validator,
    builder: AbiBuilder,
    buf: Vec<u8>,
    consumed: usize,
    done: bool,
}

impl StreamingScan {
    pub fn new(engine: &Engine) -> Self {
        StreamingScan {
            parser: Parser::new(0),
            validator: engine.new_validator(),
            builder: AbiBuilder::default(),
            buf: Vec::new(),
            consumed: 0,
            done: false,
        }
    }

    /// Appends a chunk and validates every payload it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), anyhow::Error> {
        self.buf.extend_from_slice(chunk);
        self.advance(false)
    }

    /// Total bytes received so far.
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    /// Ends the stream, returning the complete bytes and their summary.
    pub fn finish(mut self) -> Result<(Vec<u8>, AbiSummary), anyhow::Error> {
        self.advance(true)?;
        if !self.done {
            bail!("module stream ended after {} bytes", self.buf.len());
        }
        Ok((self.buf, self.builder.build()))
    }

    fn advance(&mut self, eof: bool) -> Result<(), anyhow::Error> {
        while !self.done {
            let chunk = self
                .parser
                .parse(&self.buf[self.consumed..], eof)
                .with_context(|| format!("malformed module at offset {}", self.consumed))?;
            let (consumed, payload) = match chunk {
                Chunk::NeedMoreData(_) => return Ok(()),
                Chunk::Parsed { consumed, payload } => (consumed, payload),
            };
            match self.validator.payload(&payload)? {
                ValidPayload::Func(func, body) => {
                    let mut func = func.into_validator(Default::default());
                    func.validate(&body)?;
                }
                ValidPayload::End(_) => self.done = true,
                _ => {}
            }
            self.builder.process_payload(&payload)?;
            self.consumed += consumed;
        }
        Ok(())
    }
}

#[derive(Default)]
struct AbiBuilder {
    summary: AbiSummary,
}

impl AbiBuilder {
    fn process_payload(&mut self, payload: &Payload) -> Result<(), anyhow::Error> {
        match payload {
            Payload::ImportSection(reader) => self.parse_import_section(reader.clone()),
            Payload::ExportSection(reader) => self.parse_export_section(reader.clone()),
            _ => Ok(()),
        }
    }

    fn parse_import_section(&mut self, reader: ImportSectionReader) -> Result<(), anyhow::Error> {
        for import in reader {
            self.parse_import(import?);
        }
        Ok(())
    }

    fn parse_import(&mut self, import: Import) {
        let kind = match import.ty {
            TypeRef::Func(_) => ExternKind::Func,
            TypeRef::Table(_) => ExternKind::Table,
            TypeRef::Memory(_) => ExternKind::Memory,
            TypeRef::Global(_) => ExternKind::Global,
            _ => ExternKind::Tag,
        };
        self.summary.imports.push(ImportDef {
            module: import.module.to_string(),
            name: import.name.to_string(),
            kind,
        });
    }

    fn parse_export_section(&mut self, reader: ExportSectionReader) -> Result<(), anyhow::Error> {
        for export in reader {
            self.parse_export(export?);
        }
        Ok(())
    }

    fn parse_export(&mut self, export: Export) {
        let kind = match export.kind {
            ExternalKind::Func => ExternKind::Func,
            ExternalKind::Table => ExternKind::Table,
            ExternalKind::Memory => ExternKind::Memory,
            ExternalKind::Global => ExternKind::Global,
            _ => ExternKind::Tag,
        };
        self.summary.exports.push(ExportDef {
            name: export.name.to_string(),
            kind,
        });
    }

    fn build(self) -> AbiSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAT: &str = r#"
        (module
          (import "wbg" "__wbindgen_object_drop_ref" (func (param i32)))
          (import "env" "other" (func))
          (memory (export "memory") 1)
          (func (export "__wbindgen_malloc") (param i32 i32) (result i32) i32.const 8)
          (func (export "add") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.add))
    "#;

    #[test]
    fn scan_collects_imports_and_exports() {
        let bytes = wat::parse_str(WAT).unwrap();
        let summary = scan(&Engine::default(), &bytes).unwrap();
        assert_eq!(summary.imports.len(), 2);
        assert_eq!(summary.imports_from("wbg").count(), 1);
        assert_eq!(summary.export("memory"), Some(ExternKind::Memory));
        assert_eq!(summary.export("add"), Some(ExternKind::Func));
        assert_eq!(summary.export("nope"), None);
    }

    #[test]
    fn streaming_matches_whole_buffer_scan() {
        let engine = Engine::default();
        let bytes = wat::parse_str(WAT).unwrap();
        let mut streaming = StreamingScan::new(&engine);
        for chunk in bytes.chunks(3) {
            streaming.feed(chunk).unwrap();
        }
        let (streamed, summary) = streaming.finish().unwrap();
        assert_eq!(streamed, bytes);
        assert_eq!(summary, scan(&engine, &bytes).unwrap());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let engine = Engine::default();
        let bytes = wat::parse_str(WAT).unwrap();
        let mut streaming = StreamingScan::new(&engine);
        streaming.feed(&bytes[..bytes.len() - 4]).unwrap();
        assert!(streaming.finish().is_err());
    }

    #[test]
    fn invalid_body_fails_before_end_of_stream() {
        let engine = Engine::default();
        let bytes = wat::parse_str(
            r#"(module (func (result i32) i64.const 1) (func (export "pad") nop nop nop nop))"#,
        )
        .unwrap();
        let mut streaming = StreamingScan::new(&engine);
        let cut = bytes.len() - 2;
        assert!(streaming.feed(&bytes[..cut]).is_err());
    }
}
