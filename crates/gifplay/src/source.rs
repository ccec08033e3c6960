use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;

/// Where animation bytes come from.
///
/// Named sources resolve at load time, either against an [`AssetBundle`]
/// or, when none is configured, straight against the filesystem.
#[derive(Clone, Debug)]
pub enum GifSource {
    Bytes(Arc<[u8]>),
    Named(String),
}

impl GifSource {
    pub fn named(name: impl Into<String>) -> Self {
        GifSource::Named(name.into())
    }

    pub(crate) fn resolve(&self, bundle: Option<&AssetBundle>) -> Result<Arc<[u8]>, Error> {
        match self {
            GifSource::Bytes(data) => Ok(data.clone()),
            GifSource::Named(name) => match bundle {
                Some(bundle) => bundle.load(name),
                None => read_bytes(Path::new(name)),
            },
        }
    }
}

impl From<Vec<u8>> for GifSource {
    fn from(data: Vec<u8>) -> Self {
        GifSource::Bytes(data.into())
    }
}

impl From<Arc<[u8]>> for GifSource {
    fn from(data: Arc<[u8]>) -> Self {
        GifSource::Bytes(data)
    }
}

impl From<&[u8]> for GifSource {
    fn from(data: &[u8]) -> Self {
        GifSource::Bytes(Arc::from(data))
    }
}

impl From<&str> for GifSource {
    fn from(name: &str) -> Self {
        GifSource::Named(name.to_owned())
    }
}

/// A directory of bundled assets, addressed by file name.
#[derive(Clone, Debug)]
pub struct AssetBundle {
    root: PathBuf,
}

impl AssetBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AssetBundle { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, name: &str) -> Result<Arc<[u8]>, Error> {
        read_bytes(&self.root.join(name))
    }
}

fn read_bytes(path: &Path) -> Result<Arc<[u8]>, Error> {
    match fs::read(path) {
        Ok(data) => {
            debug!("read {} bytes from {}", data.len(), path.display());
            Ok(data.into())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(Error::not_found(path.display().to_string()))
        }
        Err(err) => Err(Error::Io(err)),
    }
}
