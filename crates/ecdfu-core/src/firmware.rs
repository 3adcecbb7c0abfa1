//! Firmware container: ordered sections plus the image bytes behind them.
//!
//! Parsing firmware files into sections is left to the caller; this module
//! only defines the shape the update engine consumes and a simple in-memory
//! implementation of it.

use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Invalid section spec {0:?}, expected ADDR:FILE")]
    InvalidSectionSpec(String),
    #[error("Invalid address {0:?}")]
    InvalidAddress(String),
    #[error("No writable section found with offset {0:#x}")]
    NoWritableSection(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a section has to be written in this update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionStatus {
    #[default]
    NotNeeded,
    /// The device cannot take this section right now.
    NotPossible,
    Needed,
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionStatus::NotNeeded => write!(f, "not needed"),
            SectionStatus::NotPossible => write!(f, "not possible"),
            SectionStatus::Needed => write!(f, "needed"),
        }
    }
}

/// Independently addressable region of the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Flash address the section is written to.
    pub offset: u32,
    /// Declared size; must equal the length of the backing image.
    pub size: usize,
    pub image_index: usize,
    pub status: SectionStatus,
}

impl Section {
    pub fn is_needed(&self) -> bool {
        self.status == SectionStatus::Needed
    }
}

/// Source of sections and image bytes for an update.
pub trait FirmwareContainer {
    /// Sections in write order.
    fn sections(&self) -> &[Section];

    /// Bytes of the image at `index`, if there is one.
    fn image_bytes(&self, index: usize) -> Option<&[u8]>;
}

/// Container holding its sections and images in memory.
#[derive(Debug, Clone, Default)]
pub struct SectionedImage {
    sections: Vec<Section>,
    images: Vec<Vec<u8>>,
}

impl SectionedImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section backed by its own image; returns the section index.
    pub fn add_section(&mut self, offset: u32, data: Vec<u8>, status: SectionStatus) -> usize {
        let image_index = self.images.len();
        self.sections.push(Section {
            offset,
            size: data.len(),
            image_index,
            status,
        });
        self.images.push(data);
        self.sections.len() - 1
    }

    /// Append a section with an explicit declared size and image index.
    pub fn push_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Append an image without a section; returns its index.
    pub fn push_image(&mut self, data: Vec<u8>) -> usize {
        self.images.push(data);
        self.images.len() - 1
    }

    pub fn set_status(&mut self, index: usize, status: SectionStatus) {
        if let Some(section) = self.sections.get_mut(index) {
            section.status = status;
        }
    }

    /// Build from `ADDR:FILE` specs, every section marked needed.
    ///
    /// `ADDR` is decimal or `0x`-prefixed hex.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, ContainerError> {
        let mut image = Self::new();
        for spec in specs {
            let spec = spec.as_ref();
            let (addr, path) = spec
                .split_once(':')
                .ok_or_else(|| ContainerError::InvalidSectionSpec(spec.to_string()))?;
            let offset = parse_address(addr)?;
            let data = std::fs::read(Path::new(path))?;
            debug!(path = %path, offset = %format!("{:#x}", offset), len = data.len(), "Loaded section");
            image.add_section(offset, data, SectionStatus::Needed);
        }
        Ok(image)
    }

    /// Mark the sections that start at the device's writable offset as
    /// needed and every other section as not needed.
    pub fn pick_sections(&mut self, writable_offset: u32) -> Result<(), ContainerError> {
        let mut found = false;
        for section in &mut self.sections {
            if section.offset == writable_offset {
                section.status = SectionStatus::Needed;
                found = true;
            } else {
                section.status = SectionStatus::NotNeeded;
            }
        }
        if !found {
            return Err(ContainerError::NoWritableSection(writable_offset));
        }
        Ok(())
    }
}

impl FirmwareContainer for SectionedImage {
    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn image_bytes(&self, index: usize) -> Option<&[u8]> {
        self.images.get(index).map(|v| v.as_slice())
    }
}

fn parse_address(s: &str) -> Result<u32, ContainerError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ContainerError::InvalidAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_section_tracks_images() {
        let mut fw = SectionedImage::new();
        fw.add_section(0x0, vec![1; 16], SectionStatus::NotNeeded);
        fw.add_section(0x4_0000, vec![2; 32], SectionStatus::Needed);

        assert_eq!(fw.sections().len(), 2);
        assert_eq!(fw.sections()[1].size, 32);
        assert_eq!(fw.sections()[1].image_index, 1);
        assert_eq!(fw.image_bytes(1).unwrap()[0], 2);
        assert!(fw.image_bytes(2).is_none());
    }

    #[test]
    fn test_pick_sections() {
        let mut fw = SectionedImage::new();
        fw.add_section(0x0, vec![0; 4], SectionStatus::Needed);
        fw.add_section(0x4_0000, vec![0; 4], SectionStatus::NotNeeded);

        fw.pick_sections(0x4_0000).unwrap();
        assert!(!fw.sections()[0].is_needed());
        assert!(fw.sections()[1].is_needed());

        assert!(matches!(
            fw.pick_sections(0x1000),
            Err(ContainerError::NoWritableSection(0x1000))
        ));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("zz").is_err());
    }

    #[test]
    fn test_invalid_spec() {
        assert!(matches!(
            SectionedImage::from_specs(&["no-colon"]),
            Err(ContainerError::InvalidSectionSpec(_))
        ));
    }
}
