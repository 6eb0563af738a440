use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::Context;
use cap_std::fs as cap_fs;

use crate::error::PipelineError;

/// Files a Vosk model directory must hold for the recognizer to load.
pub const REQUIRED_FILES: [&str; 13] = [
    "conf/model.conf",
    "conf/mfcc.conf",
    "am/final.mdl",
    "graph/Gr.fst",
    "graph/HCLr.fst",
    "graph/phones/word_boundary.int",
    "graph/disambig_tid.int",
    "ivector/online_cmvn.conf",
    "ivector/final.mat",
    "ivector/splice.conf",
    "ivector/global_cmvn.stats",
    "ivector/final.dubm",
    "ivector/final.ie",
];

/// A directory of models. All access goes through cap-std, so model names
/// can't reach outside of it.
pub struct ModelsRepo {
    dir: cap_fs::Dir,
    path: PathBuf,
}

impl ModelsRepo {
    pub fn from_path(path: PathBuf) -> anyhow::Result<Self> {
        fs::DirBuilder::new()
            .recursive(true)
            .create(&path)
            .with_context(|| format!("creating models directory {}", path.display()))?;
        let dir = cap_fs::Dir::open_ambient_dir(&path, cap_std::ambient_authority())
            .with_context(|| format!("opening models directory {}", path.display()))?;
        Ok(Self { dir, path })
    }

    pub fn model_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn missing_files(&self, name: &str) -> Vec<&'static str> {
        REQUIRED_FILES
            .iter()
            .filter(|f| !self.dir.exists(Path::new(name).join(f)))
            .copied()
            .collect()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.missing_files(name).is_empty()
    }

    pub fn verify(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let missing = self.missing_files(name);
        if missing.is_empty() {
            return Ok(self.model_path(name));
        }
        Err(PipelineError::ModelLoadFailed {
            path: self.model_path(name),
            reason: format!("missing {}", missing.join(", ")),
        })
    }

    /// Copies the required files that are missing from `source`, which
    /// holds an unpacked model (e.g. assets bundled with the app). Files
    /// already present are left alone. Returns how many were copied.
    pub fn install_from(&self, source: &Path, name: &str) -> anyhow::Result<usize> {
        let mut copied = 0;
        for file in self.missing_files(name) {
            let target = Path::new(name).join(file);
            if let Some(parent) = target.parent() {
                self.dir
                    .create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let from = source.join(file);
            let mut input = fs::File::open(&from)
                .with_context(|| format!("can't open model file {}", from.display()))?;
            let mut output = self
                .dir
                .open_with(
                    &target,
                    cap_fs::OpenOptions::new().write(true).create_new(true),
                )
                .with_context(|| format!("can't create {}", target.display()))?;
            io::copy(&mut input, &mut output)
                .with_context(|| format!("copying model file to {}", target.display()))?;
            log::info!("copied vosk model file {}", target.display());
            copied += 1;
        }
        Ok(copied)
    }

    pub fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.dir.remove_dir_all(name)?;
        Ok(())
    }
}
