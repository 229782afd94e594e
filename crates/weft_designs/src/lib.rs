//! Reference designs for the Weft toolchain.
//!
//! Each design is a [`Library`] plus the name of its root module, listed in
//! the [`catalog`] under the name project files use in `system.design`.

#![warn(missing_docs)]

pub mod esi_ram;

use std::path::Path;
use weft_build::{BuildError, Library, System};
use weft_config::{Arbitration, BackendPreset};

/// A catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct DesignEntry {
    /// Catalog name.
    pub name: &'static str,
    /// Root module.
    pub top: &'static str,
    /// One-line summary.
    pub description: &'static str,
    build: fn() -> Result<Library, BuildError>,
}

impl DesignEntry {
    /// Builds the design's library.
    pub fn library(&self) -> Result<Library, BuildError> {
        (self.build)()
    }

    /// Creates a system for this design.
    pub fn system(
        &self,
        name: &str,
        preset: BackendPreset,
        arbitration: Option<Arbitration>,
        output_dir: &Path,
    ) -> Result<System, BuildError> {
        Ok(
            System::new(name, self.library()?, self.top, preset, output_dir)
                .with_arbitration(arbitration),
        )
    }
}

static CATALOG: &[DesignEntry] = &[
    DesignEntry {
        name: "esi_ram",
        top: esi_ram::TOP,
        description: "8x64-bit RAM with a word-copying writer and host pass-through",
        build: esi_ram::library,
    },
    DesignEntry {
        name: "esi_ram_host",
        top: esi_ram::TOP,
        description: "esi_ram with host pass-through required on every backend",
        build: forced_host,
    },
];

fn forced_host() -> Result<Library, BuildError> {
    esi_ram::library_with(esi_ram::HostPassThrough::Always)
}

/// Returns every design.
pub fn catalog() -> &'static [DesignEntry] {
    CATALOG
}

/// Looks a design up by name.
pub fn find(name: &str) -> Option<&'static DesignEntry> {
    CATALOG.iter().find(|d| d.name == name)
}
