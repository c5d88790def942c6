//! Symbol table
//!
//! Maps firmware symbol names to absolute memory addresses, loaded once from
//! a `.sym` text file with one `<name> = <hex address>;` entry per line.
//! Lines that do not match the pattern are ignored. The table is immutable
//! after load and safe to share by reference.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use thiserror::Error;

/// Symbol lookup and parse errors
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("failed to read symbol file: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable name -> address mapping
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    syms: HashMap<String, u32>,
}

impl SymbolTable {
    /// Load a symbol table from a `.sym` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SymbolError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_str_lossy(&text))
    }

    /// Parse symbol definitions from text, skipping non-matching lines
    pub fn from_str_lossy(text: &str) -> Self {
        // Same line pattern the firmware toolchain emits.
        let re = Regex::new(r"^(.*) = (0x[0-9a-fA-F]+);").expect("static regex");
        let mut syms = HashMap::new();
        for line in text.lines() {
            if let Some(caps) = re.captures(line) {
                if let Ok(addr) = u32::from_str_radix(caps[2].trim_start_matches("0x"), 16) {
                    syms.insert(caps[1].to_string(), addr);
                }
            }
        }
        Self { syms }
    }

    /// Resolve a symbol to its address; unknown names are an error, never a
    /// default
    pub fn address(&self, name: &str) -> Result<u32, SymbolError> {
        self.syms
            .get(name)
            .copied()
            .ok_or_else(|| SymbolError::UnknownSymbol(name.to_string()))
    }

    /// Number of symbols loaded
    pub fn len(&self) -> usize {
        self.syms.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}
