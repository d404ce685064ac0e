use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ResultExt};

/// On-disk encoding of a saved object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFormat {
    /// bincode
    #[default]
    Binary,
    /// Pretty-printed JSON.
    Json,
}

impl ObjectFormat {
    /// `.json` files are JSON, everything else is binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ObjectFormat::Json,
            _ => ObjectFormat::Binary,
        }
    }
}

/// Serialize `obj` to `path`, creating parent directories. The format follows
/// the file extension.
pub fn save_object<P: AsRef<Path>, T: Serialize>(path: P, obj: &T) -> Result<()> {
    let path = path.as_ref();
    save_object_as(path, obj, ObjectFormat::from_path(path))
}

pub fn save_object_as<P: AsRef<Path>, T: Serialize>(path: P, obj: &T, format: ObjectFormat) -> Result<()> {
    let path = path.as_ref();
    let shown = path.display();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("creating {}", shown))?;
    let mut writer = BufWriter::new(file);
    match format {
        ObjectFormat::Binary => bincode::serialize_into(&mut writer, obj)
            .with_context(|| format!("writing {}", shown))?,
        ObjectFormat::Json => serde_json::to_writer_pretty(&mut writer, obj)
            .with_context(|| format!("writing {}", shown))?,
    }
    writer.flush().with_context(|| format!("writing {}", shown))?;

    debug!(path = %shown, ?format, "object saved");
    Ok(())
}

/// Deserialize an object previously written by [`save_object`].
pub fn load_object<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let path = path.as_ref();
    load_object_as(path, ObjectFormat::from_path(path))
}

pub fn load_object_as<P: AsRef<Path>, T: DeserializeOwned>(path: P, format: ObjectFormat) -> Result<T> {
    let path = path.as_ref();
    let shown = path.display();

    let file = File::open(path).with_context(|| format!("opening {}", shown))?;
    let reader = BufReader::new(file);
    let obj = match format {
        ObjectFormat::Binary => {
            bincode::deserialize_from(reader).with_context(|| format!("reading {}", shown))?
        }
        ObjectFormat::Json => {
            serde_json::from_reader(reader).with_context(|| format!("reading {}", shown))?
        }
    };
    Ok(obj)
}
