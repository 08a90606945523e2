use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::render_default_config;

pub const STATE_DIR_NAME: &str = ".tarkovdata";
pub const DATA_DIR_NAME: &str = "data";
pub const EXPORT_DIR_NAME: &str = "graphql/data";

pub const AMMUNITION_FILE: &str = "ammunition.json";
pub const HIDEOUT_FILE: &str = "hideout.json";
pub const LEVELS_FILE: &str = "levels.json";
pub const QUESTS_FILE: &str = "quests.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub data_source: ValueSource,
    pub export_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Layout rooted at `project_root` with every path at its default location.
    pub fn for_root(project_root: &Path) -> Self {
        let state_dir = project_root.join(STATE_DIR_NAME);
        Self {
            project_root: project_root.to_path_buf(),
            data_dir: project_root.join(DATA_DIR_NAME),
            export_dir: project_root.join(EXPORT_DIR_NAME),
            config_path: state_dir.join("config.toml"),
            state_dir,
            root_source: ValueSource::Flag,
            data_source: ValueSource::Default,
            export_source: ValueSource::Default,
            config_source: ValueSource::Default,
        }
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\ndata_dir={} ({})\nexport_dir={} ({})\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.data_dir),
            self.data_source.as_str(),
            normalize_for_display(&self.export_dir),
            self.export_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (data_dir, data_source) = resolve_dir(
        overrides.data_dir.as_deref(),
        lookup_env("TARKOVDATA_DATA_DIR"),
        &project_root,
        project_root.join(DATA_DIR_NAME),
    );
    let (export_dir, export_source) = resolve_dir(
        overrides.export_dir.as_deref(),
        lookup_env("TARKOVDATA_EXPORT_DIR"),
        &project_root,
        project_root.join(EXPORT_DIR_NAME),
    );
    let (config_path, config_source) = resolve_dir(
        overrides.config.as_deref(),
        lookup_env("TARKOVDATA_CONFIG"),
        &project_root,
        state_dir.join("config.toml"),
    );

    Ok(ResolvedPaths {
        project_root,
        state_dir,
        data_dir,
        export_dir,
        config_path,
        root_source,
        data_source,
        export_source,
        config_source,
    })
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn init_layout(paths: &ResolvedPaths, force: bool) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.data_dir, &paths.export_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }
    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = lookup_env("TARKOVDATA_PROJECT_ROOT")
        && !value.trim().is_empty()
    {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    match detect_project_root_heuristic(&context.cwd) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

fn resolve_dir(
    flag: Option<&Path>,
    env_value: Option<String>,
    project_root: &Path,
    default: PathBuf,
) -> (PathBuf, ValueSource) {
    if let Some(path) = flag {
        return (absolutize(path, project_root), ValueSource::Flag);
    }
    if let Some(value) = env_value
        && !value.trim().is_empty()
    {
        return (
            absolutize(Path::new(value.trim()), project_root),
            ValueSource::Env,
        );
    }
    (default, ValueSource::Default)
}

fn detect_project_root_heuristic(cwd: &Path) -> Option<PathBuf> {
    let mut seen = HashSet::new();
    for candidate in cwd.ancestors() {
        if !seen.insert(normalize_for_display(candidate)) {
            continue;
        }
        if candidate.join(DATA_DIR_NAME).is_dir() || candidate.join(STATE_DIR_NAME).is_dir() {
            return Some(candidate.to_path_buf());
        }
    }
    None
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
