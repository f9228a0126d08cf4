use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::fs;
use tracing::{instrument, warn};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("skill name pattern must compile"))
}

const MAX_DESCRIPTION_LEN: usize = 1024;
const MAX_COMPATIBILITY_LEN: usize = 500;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SkillParseError {
    #[error("SKILL.md missing YAML frontmatter delimiters")]
    MissingFrontmatter,
    #[error("frontmatter is not valid YAML: {0}")]
    InvalidYaml(String),
    #[error("skill name '{0}' does not match ^[a-z0-9]+(?:-[a-z0-9]+)*$")]
    InvalidName(String),
    #[error("skill name '{name}' does not match its directory name '{dir}'")]
    NameDirMismatch { name: String, dir: String },
    #[error("description exceeds {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
    #[error("compatibility exceeds {MAX_COMPATIBILITY_LEN} characters")]
    CompatibilityTooLong,
}

/// Either a whitespace-separated string or a sequence; normalized to a
/// deduplicated `Vec<String>` (§4.6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllowedTools(pub Vec<String>);

impl<'de> Deserialize<'de> for AllowedTools {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            List(Vec<String>),
        }

        let raw = Raw::deserialize(deserializer)?;
        let items = match raw {
            Raw::Str(s) => s.split_whitespace().map(str::to_owned).collect::<Vec<_>>(),
            Raw::List(list) => list,
        };
        let mut deduped = Vec::new();
        for item in items {
            if !deduped.contains(&item) {
                deduped.push(item);
            }
        }
        Ok(AllowedTools(deduped))
    }
}

/// Parsed `SKILL.md` frontmatter (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillFrontmatter {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub compatibility: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, rename = "allowed-tools")]
    pub allowed_tools: AllowedTools,
}

/// A loaded skill: its frontmatter, markdown body, and directory on disk.
#[derive(Debug, Clone)]
pub struct Skill {
    pub frontmatter: SkillFrontmatter,
    pub body: String,
    pub dir: PathBuf,
}

fn split_frontmatter(raw: &str) -> Result<(&str, &str), SkillParseError> {
    let trimmed = raw.trim_start();
    let rest = trimmed.strip_prefix("---").ok_or(SkillParseError::MissingFrontmatter)?;
    let end = rest.find("\n---").ok_or(SkillParseError::MissingFrontmatter)?;
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n');
    Ok((frontmatter, body))
}

fn validate(frontmatter: &SkillFrontmatter, dir_name: &str) -> Result<(), SkillParseError> {
    if !name_pattern().is_match(&frontmatter.name) {
        return Err(SkillParseError::InvalidName(frontmatter.name.clone()));
    }
    if frontmatter.name != dir_name {
        return Err(SkillParseError::NameDirMismatch {
            name: frontmatter.name.clone(),
            dir: dir_name.to_owned(),
        });
    }
    if frontmatter.description.len() > MAX_DESCRIPTION_LEN {
        return Err(SkillParseError::DescriptionTooLong);
    }
    if let Some(compat) = &frontmatter.compatibility
        && compat.len() > MAX_COMPATIBILITY_LEN
    {
        return Err(SkillParseError::CompatibilityTooLong);
    }
    Ok(())
}

/// Loads skills from a directory of `<name>/SKILL.md` subdirectories (§4.6).
pub struct SkillLoader;

impl SkillLoader {
    /// Parses a single `SKILL.md`'s contents, validating against the
    /// directory name it was loaded from.
    pub fn parse(raw: &str, dir_name: &str) -> Result<(SkillFrontmatter, String), SkillParseError> {
        let (frontmatter_raw, body) = split_frontmatter(raw)?;
        let frontmatter: SkillFrontmatter =
            serde_yaml::from_str(frontmatter_raw).map_err(|e| SkillParseError::InvalidYaml(e.to_string()))?;
        validate(&frontmatter, dir_name)?;
        Ok((frontmatter, body.to_owned()))
    }

    /// Loads every subdirectory of `root` that contains a `SKILL.md`;
    /// subdirectories without one are silently skipped (§4.6).
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub async fn load_dir(root: impl AsRef<Path>) -> kairos_errors::KairosResult<Vec<Skill>> {
        let root = root.as_ref();
        let mut skills = Vec::new();
        let mut entries = fs::read_dir(root)
            .await
            .map_err(|e| kairos_errors::KairosError::not_found(format!("skills directory {root:?} not readable")).with_cause(e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| kairos_errors::KairosError::internal("failed reading skills directory entry").with_cause(e))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let skill_md = path.join("SKILL.md");
            if !fs::try_exists(&skill_md).await.unwrap_or(false) {
                continue;
            }
            let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_owned();
            let raw = match fs::read_to_string(&skill_md).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(skill = %dir_name, %err, "failed reading SKILL.md");
                    continue;
                }
            };
            match Self::parse(&raw, &dir_name) {
                Ok((frontmatter, body)) => skills.push(Skill {
                    frontmatter,
                    body,
                    dir: path,
                }),
                Err(err) => warn!(skill = %dir_name, %err, "skipping invalid skill"),
            }
        }
        Ok(skills)
    }
}
