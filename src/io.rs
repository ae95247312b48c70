// io.rs
// Scenario persistence: a JSON document (optionally gzip-compressed) holding
// the global settings plus the full particle list. Loading is all-or-nothing;
// a file that fails to parse leaves the caller's simulation untouched.

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use crate::config::Settings;
use crate::particle::ParticleConfig;
use crate::profile_scope;

/// The persisted scenario document. The particle list keeps its historical
/// field name so existing files keep loading.
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedScenario {
    #[serde(default)]
    pub settings: Settings,
    pub particulas: Vec<ParticleConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("scenario file is not a valid scenario document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read a scenario from disk. Gzip-compressed files are detected by magic
/// number, not extension.
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<SavedScenario, ScenarioError> {
    profile_scope!("load_scenario");
    let data = std::fs::read(path.as_ref())?;
    let scenario = if let Some(decoded) = maybe_decompress_gzip(&data)? {
        serde_json::from_slice(&decoded)?
    } else {
        serde_json::from_slice(&data)?
    };
    Ok(scenario)
}

/// Write a scenario to disk, optionally gzip-compressed. The document goes
/// to a `.tmp` sibling first and is renamed into place, so an interrupted
/// save never truncates an existing file.
pub fn save_scenario<P: AsRef<Path>>(
    path: P,
    scenario: &SavedScenario,
    compress: bool,
) -> Result<(), ScenarioError> {
    profile_scope!("save_scenario");
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension({
        let mut os = path.extension().map(|e| e.to_os_string()).unwrap_or_default();
        os.push(".tmp");
        os
    });
    {
        let file = std::fs::File::create(&tmp_path)?;
        let writer = BufWriter::new(file);
        if compress {
            let mut encoder = GzEncoder::new(writer, Compression::fast());
            serde_json::to_writer(&mut encoder, scenario)?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
        } else {
            serde_json::to_writer(writer, scenario)?;
        }
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn maybe_decompress_gzip(data: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    if data.len() < 2 || data[0] != 0x1f || data[1] != 0x8b {
        return Ok(None);
    }
    let mut decoder = GzDecoder::new(Cursor::new(data));
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(Some(decoded))
}
