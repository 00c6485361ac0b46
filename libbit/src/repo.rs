use crate::error::BitResult;
use crate::index::BitIndex;
use crate::path::{self, BitPath};
use crate::tls;
use anyhow::Context;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::fs::{self, File};
use std::io::{self, Write};
use std::ops::Deref;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const BIT_INDEX_FILE_PATH: &str = "index";
pub const BIT_HEAD_FILE_PATH: &str = "HEAD";
pub const BIT_CONFIG_FILE_PATH: &str = "config";

#[derive(Copy, Clone)]
pub struct BitRepo<'rcx> {
    rcx: &'rcx RepoCtxt<'rcx>,
}

impl PartialEq for BitRepo<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.rcx, other.rcx)
    }
}

pub struct RepoCtxt<'rcx> {
    // ok to make this public as there is only ever
    // shared (immutable) access to this struct
    pub workdir: BitPath,
    pub bitdir: BitPath,
    config_filepath: BitPath,
    index_filepath: BitPath,
    index_cell: OnceLock<RwLock<BitIndex<'rcx>>>,
}

impl<'rcx> RepoCtxt<'rcx> {
    fn new(workdir: PathBuf, bitdir: PathBuf, config_filepath: PathBuf) -> BitResult<Self> {
        let workdir = BitPath::intern(workdir);
        let bitdir = BitPath::intern(bitdir);
        let config_filepath = BitPath::intern(config_filepath);
        let index_filepath = bitdir.join(BIT_INDEX_FILE_PATH);

        Ok(Self { config_filepath, workdir, bitdir, index_filepath, index_cell: OnceLock::new() })
    }

    fn find_inner(path: &Path) -> BitResult<Self> {
        if path.join(".git").exists() {
            return Self::load(path);
        }

        // also recognize `.bit` folder as its convenient for having bit repos under tests/repos
        // it is for testing and debugging purposes only
        if path.join(".bit").exists() {
            return Self::load_with_bitdir(path, ".bit");
        }

        match path.parent() {
            Some(parent) => Self::find_inner(parent),
            None => Err(anyhow!("not a bit repository (or any of the parent directories)")),
        }
    }

    fn load_with_bitdir(path: impl AsRef<Path>, bitdir: impl AsRef<Path>) -> BitResult<Self> {
        let worktree = path
            .as_ref()
            .canonicalize()
            .with_context(|| anyhow!("failed to load bit in non-existent directory"))?;
        let bitdir = worktree.join(bitdir);
        debug_assert!(bitdir.exists());
        let config_filepath = bitdir.join(BIT_CONFIG_FILE_PATH);

        let rcx = RepoCtxt::new(worktree, bitdir, config_filepath)?;

        let version = rcx
            .with_local_config(|config| config.repositoryformatversion())?
            .expect("`repositoryformatversion` missing in configuration");

        ensure!(
            version == 0,
            "unsupported repositoryformatversion `{}`, expected version 0",
            version
        );

        Ok(rcx)
    }

    fn load(path: impl AsRef<Path>) -> BitResult<Self> {
        Self::load_with_bitdir(path, ".git")
    }

    pub fn with<R>(&'rcx self, f: impl FnOnce(BitRepo<'rcx>) -> R) -> R {
        f(BitRepo { rcx: self })
    }

    #[inline]
    pub fn config_path(&self) -> BitPath {
        self.config_filepath
    }

    #[inline]
    pub fn index_path(&self) -> BitPath {
        self.index_filepath
    }

    pub fn with_local_config<R>(
        &self,
        f: impl for<'c> FnOnce(&mut crate::config::BitConfig<'c>) -> BitResult<R>,
    ) -> BitResult<R> {
        crate::config::BitConfig::with_local(self.config_path(), f)
    }
}

impl<'rcx> BitRepo<'rcx> {
    /// initialize a repository and use it in the closure
    // testing convenience function
    #[cfg(test)]
    pub fn init_load<R>(
        path: impl AsRef<Path>,
        f: impl FnOnce(BitRepo<'_>) -> BitResult<R>,
    ) -> BitResult<R> {
        Self::init(&path)?;
        let ctxt = RepoCtxt::load(&path)?;
        tls::enter_repo(&ctxt, f)
    }

    /// recursively searches parents starting from the current directory for a git repo
    pub fn find<R>(
        path: impl AsRef<Path>,
        f: impl FnOnce(BitRepo<'_>) -> BitResult<R>,
    ) -> BitResult<R> {
        let path = path.as_ref();
        let canonical_path = path.canonicalize().with_context(|| {
            format!("failed to find bit repository in nonexistent path `{}`", path.display())
        })?;
        let ctxt = RepoCtxt::find_inner(canonical_path.as_ref())?;

        tls::enter_repo(&ctxt, f)
    }

    fn index_ref(&self) -> BitResult<&RwLock<BitIndex<'rcx>>> {
        match self.index_cell.get() {
            Some(cell) => Ok(cell),
            None => {
                let index = RwLock::new(BitIndex::new(*self)?);
                // another thread may have raced us; either way `get()` after this succeeds
                let _ = self.index_cell.set(index);
                Ok(self.index_cell.get().unwrap())
            }
        }
    }

    pub fn with_index<R>(self, f: impl FnOnce(&BitIndex<'rcx>) -> BitResult<R>) -> BitResult<R> {
        f(&*self.index_ref()?.read())
    }

    pub fn with_index_mut<R>(
        self,
        f: impl FnOnce(&mut BitIndex<'_>) -> BitResult<R>,
    ) -> BitResult<R> {
        let index_ref = self.index_ref()?;
        let index = &mut *index_ref.write();
        match f(index) {
            Ok(r) => Ok(r),
            Err(err) => {
                index.rollback();
                Err(err)
            }
        }
    }

    // returns unit as we don't want anyone accessing the repo directly like this
    pub fn init(path: impl AsRef<Path>) -> BitResult<()> {
        let workdir = path.as_ref().canonicalize()?;

        if workdir.is_file() {
            bail!("`{}` is not a directory", workdir.display())
        }

        // `.git` directory not `.bit` as this should be fully compatible with git
        // although, bit will recognize a `.bit` folder if explicitly renamed
        let bitdir = workdir.join(".git");

        if bitdir.exists() {
            // reinitializing doesn't really do anything currently
            println!("reinitialized existing bit repository in `{}`", workdir.display());
            return Ok(());
        }

        std::fs::create_dir(&bitdir)?;

        let config_filepath = bitdir.join(BIT_CONFIG_FILE_PATH);

        RepoCtxt::new(workdir, bitdir, config_filepath)?.with(|repo| {
            let mut head = repo.mk_bitfile("HEAD")?;
            writeln!(head, "ref: refs/heads/master")?;

            repo.with_local_config(|config| {
                config.set("core", "repositoryformatversion", 0)?;
                config.set("core", "bare", false)?;
                config.set("core", "filemode", true)?;
                Ok(())
            })?;

            println!("initialized empty bit repository in `{}`", repo.workdir.display());
            Ok(())
        })
    }

    /// converts relative_paths to absolute paths
    /// checks absolute paths exist and have a base relative to the bit directory
    // can't figure out how to make this take an impl AsRef<Path> and make lifetimes work out
    pub fn normalize_path(self, path: &Path) -> BitResult<Cow<'_, Path>> {
        // `self.worktree` should be a canonical, absolute path
        // and path should be relative to it, so we can just join them
        debug_assert!(self.workdir.is_absolute());
        if path.is_relative() {
            let normalized = path::normalize(&self.to_absolute_path(path));
            debug_assert!(
                normalized.symlink_metadata().is_ok(),
                "normalized path `{}` does not exist",
                normalized.display()
            );
            Ok(Cow::Owned(normalized))
        } else {
            debug_assert!(
                path.starts_with(&self.workdir),
                "absolute path `{}` is not under current bit directory `{}`",
                path.display(),
                self.workdir
            );
            Ok(Cow::Borrowed(path))
        }
    }

    /// convert a relative path to be absolute based off the repository root
    /// use [`Self::normalize_path`] if you expect the path to exist
    pub fn to_absolute_path(self, path: impl AsRef<Path>) -> BitPath {
        self.workdir.join(path)
    }

    /// converts an absolute path into a path relative to the workdir of the repository
    pub fn to_relative_path(self, path: &Path) -> BitResult<&Path> {
        // this seems to work just as well as the pathdiff crate
        debug_assert!(path.is_absolute());
        Ok(path.strip_prefix(&self.workdir)?)
    }

    #[cfg(test)]
    pub(crate) fn relative_paths(self, paths: &[impl AsRef<Path>]) -> BitPath {
        paths.iter().fold(self.bitdir, |base, path| base.join(path))
    }

    pub(crate) fn mk_bitdir(self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::create_dir_all(self.bitdir.join(path))
    }

    pub(crate) fn mk_bitfile(self, path: impl AsRef<Path>) -> io::Result<File> {
        File::create(self.bitdir.join(path))
    }
}

impl Debug for BitRepo<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitRepo")
            .field("worktree", &self.workdir)
            .field("bitdir", &self.bitdir)
            .finish_non_exhaustive()
    }
}

impl<'rcx> Deref for BitRepo<'rcx> {
    type Target = RepoCtxt<'rcx>;

    fn deref(&self) -> &Self::Target {
        self.rcx
    }
}
