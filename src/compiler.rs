//! Compiler entry point.
//!
//! A [`Compiler`] holds the immutable environment shared across documents:
//! the type model, the importable tag libraries and the resource loader
//! backing static includes. Each `compile` call builds its own context, so
//! one compiler may serve many threads.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::BuildContext;
use crate::emit::{self, CompiledUnit};
use crate::error::CompileError;
use crate::scanner::Scanner;
use crate::tags::TagLibrary;
use crate::types::TypeModel;

/// Source access for `%@include` directives.
pub trait ResourceLoader: Send + Sync {
    /// The text at an absolute document path, `None` when absent.
    fn load(&self, path: &str) -> Option<String>;
}

/// Everything a compilation needs besides the document itself.
pub struct CompileEnv {
    pub type_model: Arc<dyn TypeModel>,
    pub libraries: HashMap<String, Arc<dyn TagLibrary>>,
    pub loader: Option<Arc<dyn ResourceLoader>>,
}

impl CompileEnv {
    pub fn with_model(type_model: Arc<dyn TypeModel>) -> Self {
        CompileEnv {
            type_model,
            libraries: HashMap::new(),
            loader: None,
        }
    }

    pub fn library(mut self, uri: &str, library: Arc<dyn TagLibrary>) -> Self {
        self.libraries.insert(uri.to_string(), library);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
}

pub struct Compiler {
    env: CompileEnv,
}

impl Compiler {
    pub fn new(env: CompileEnv) -> Self {
        Compiler { env }
    }

    pub fn with_model(type_model: Arc<dyn TypeModel>) -> Self {
        Compiler::new(CompileEnv::with_model(type_model))
    }

    /// Compile one document into handler source. `uri` names the document
    /// and shapes the emitted class name; failures carry the 1-based
    /// position the scanner had reached.
    pub fn compile(&self, uri: &str, source: &str) -> Result<CompiledUnit, CompileError> {
        log::info!("generating handler source from {}", uri);
        let mut ctx = BuildContext::new(uri, &self.env);
        let mut scanner = Scanner::new();
        let mut line = 1u32;
        let mut column = 0u32;
        for ch in source.chars() {
            if ch == '\n' {
                line += 1;
                column = 0;
            } else if ch != '\r' {
                column += 1;
            }
            scanner
                .write(ch, &mut ctx)
                .map_err(|e| e.at(line, column))?;
        }
        scanner.finish(&mut ctx).map_err(|e| e.at(line, column))?;
        ctx.flush_literal();
        Ok(emit::render(&ctx))
    }
}
