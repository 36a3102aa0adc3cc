//! Built-in workloads shipped with the worker.
//!
//! These are what task images run; the pipeline only ever sees their
//! stdout. They print JSON with the separators and ASCII escaping of the
//! reference workloads (`", "`, `": "`, `\uXXXX`), because that output is
//! what gets hashed and compared against other workers' commitments.
//!
//! - [`multiply`]: element-wise product of two lists
//! - [`curate`]: null pruning and deduplication of a record list

pub mod curate;
pub mod multiply;

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("{0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Fetch(#[from] reqwest::Error),

    #[error("{0}")]
    Shape(String),
}

/// `{"error": "<message>"}`, the failure shape every workload prints.
pub fn error_value(message: impl ToString) -> Value {
    serde_json::json!({ "error": message.to_string() })
}

/// Serialize `value` the way the reference workloads do.
pub fn to_output(value: &Value) -> String {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8(buf).unwrap_or_default(),
        Err(e) => error_value(e).to_string(),
    }
}

/// Compact JSON with a space after `,` and `:` and non-ASCII escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
