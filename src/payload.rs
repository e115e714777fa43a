//! Payload fixtures shared by every instance of a run.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size class of the payload raced through every transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum PayloadSize {
    /// The four byte string `ping`
    #[value(name = "tiny")]
    #[serde(rename = "tiny")]
    Tiny,

    /// 1 KiB
    #[value(name = "1kb")]
    #[serde(rename = "1kb")]
    OneKb,

    /// 10 KiB
    #[value(name = "10kb")]
    #[serde(rename = "10kb")]
    TenKb,

    /// 100 KiB
    #[value(name = "100kb")]
    #[serde(rename = "100kb")]
    HundredKb,
}

impl PayloadSize {
    pub fn byte_len(self) -> usize {
        match self {
            PayloadSize::Tiny => TINY_PAYLOAD.len(),
            PayloadSize::OneKb => 1024,
            PayloadSize::TenKb => 10 * 1024,
            PayloadSize::HundredKb => 100 * 1024,
        }
    }

    /// Fixture file name looked up inside the payload directory
    pub fn file_name(self) -> &'static str {
        match self {
            PayloadSize::Tiny => "tiny.txt",
            PayloadSize::OneKb => "1kb.txt",
            PayloadSize::TenKb => "10kb.txt",
            PayloadSize::HundredKb => "100kb.txt",
        }
    }
}

impl std::fmt::Display for PayloadSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadSize::Tiny => write!(f, "tiny"),
            PayloadSize::OneKb => write!(f, "1kb"),
            PayloadSize::TenKb => write!(f, "10kb"),
            PayloadSize::HundredKb => write!(f, "100kb"),
        }
    }
}

const TINY_PAYLOAD: &[u8] = b"ping";

/// Printable filler for synthetic payloads, so text-only transports carry it too
const FILLER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Immutable payload blob; clones share the same buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Load the fixture for `size` from `dir`, or synthesize one when no
    /// directory is given
    pub fn load(size: PayloadSize, dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => {
                let path = dir.join(size.file_name());
                let data = std::fs::read(&path)
                    .with_context(|| format!("Failed to read payload fixture {:?}", path))?;
                if data.is_empty() {
                    bail!("Payload fixture {:?} is empty", path);
                }
                Ok(Self::new(data))
            }
            None => Ok(Self::synthetic(size)),
        }
    }

    /// Deterministic payload of exactly `size.byte_len()` bytes
    pub fn synthetic(size: PayloadSize) -> Self {
        if size == PayloadSize::Tiny {
            return Self::new(Bytes::from_static(TINY_PAYLOAD));
        }
        let data: Vec<u8> = FILLER.iter().copied().cycle().take(size.byte_len()).collect();
        Self::new(data)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
