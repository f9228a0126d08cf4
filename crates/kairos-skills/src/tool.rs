use std::path::PathBuf;

use kairos_errors::{KairosError, KairosResult};
use tokio::fs;

use crate::loader::Skill;

const RESOURCE_SUBDIRS: &[&str] = &["scripts", "references", "assets"];

#[derive(Debug, Clone, serde::Serialize)]
pub struct SkillResource {
    pub path: String,
    pub subdir: String,
}

/// Exposes a loaded skill through the two-phase progressive-disclosure
/// surface (§4.6): metadata is visible before `activate`; the body and
/// resources are revealed only after.
pub struct SkillTool {
    skill: Skill,
}

impl SkillTool {
    pub fn new(skill: Skill) -> Self {
        Self { skill }
    }

    pub fn name(&self) -> &str {
        &self.skill.frontmatter.name
    }

    pub fn description(&self) -> &str {
        &self.skill.frontmatter.description
    }

    /// `activate` returns `(name, instructions=body, resources=list)`.
    pub async fn activate(&self) -> KairosResult<(String, String, Vec<SkillResource>)> {
        let resources = self.list_resources().await?;
        Ok((self.skill.frontmatter.name.clone(), self.skill.body.clone(), resources))
    }

    /// Enumerates `scripts/`, `references/`, and `assets/` subdirectory
    /// contents, if present.
    pub async fn list_resources(&self) -> KairosResult<Vec<SkillResource>> {
        let mut resources = Vec::new();
        for subdir in RESOURCE_SUBDIRS {
            let dir = self.skill.dir.join(subdir);
            if !fs::try_exists(&dir).await.unwrap_or(false) {
                continue;
            }
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| KairosError::internal(format!("failed reading {subdir} directory")).with_cause(e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| KairosError::internal("failed reading resource entry").with_cause(e))?
            {
                if entry.path().is_file() {
                    resources.push(SkillResource {
                        path: format!("{subdir}/{}", entry.file_name().to_string_lossy()),
                        subdir: (*subdir).to_owned(),
                    });
                }
            }
        }
        Ok(resources)
    }

    /// Reads a resource file within the skill directory, verifying the
    /// resolved path remains inside it. Mirrors the teacher's
    /// canonicalize-then-`starts_with` guard against directory traversal.
    pub async fn load_resource(&self, path: &str) -> KairosResult<String> {
        let resolved = self.resolve_within_skill(path)?;
        fs::read_to_string(&resolved)
            .await
            .map_err(|e| KairosError::not_found(format!("resource not found: {path}")).with_cause(e))
    }

    fn resolve_within_skill(&self, path: &str) -> KairosResult<PathBuf> {
        let subdir = path.split('/').next().unwrap_or_default();
        if !RESOURCE_SUBDIRS.contains(&subdir) {
            return Err(KairosError::invalid_input(format!(
                "resource path must be under scripts/, references/, or assets/: {path}"
            )));
        }

        let candidate = self.skill.dir.join(path);
        let skill_root = self.skill.dir.canonicalize().map_err(|e| {
            KairosError::internal("failed canonicalizing skill directory").with_cause(e)
        })?;

        let parent = candidate.parent().unwrap_or(skill_root.as_path());
        if !parent.exists() {
            return Err(KairosError::not_found(format!("resource not found: {path}")));
        }
        let canonical_parent = parent
            .canonicalize()
            .map_err(|e| KairosError::internal("failed canonicalizing resource parent").with_cause(e))?;

        if !canonical_parent.starts_with(&skill_root) {
            return Err(KairosError::invalid_input(format!(
                "resource path escapes skill directory: {path}"
            )));
        }

        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SkillFrontmatter;

    async fn sample_skill() -> (tempfile::TempDir, Skill) {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("greeter");
        tokio::fs::create_dir_all(skill_dir.join("scripts")).await.unwrap();
        tokio::fs::write(skill_dir.join("scripts").join("run.sh"), "echo hi").await.unwrap();

        let skill = Skill {
            frontmatter: SkillFrontmatter {
                name: "greeter".into(),
                description: "says hello".into(),
                license: None,
                compatibility: None,
                metadata: serde_json::Value::Null,
                allowed_tools: Default::default(),
            },
            body: "# Greeter\ninstructions".into(),
            dir: skill_dir,
        };
        (dir, skill)
    }

    #[tokio::test]
    async fn activate_returns_instructions_and_resources() {
        let (_dir, skill) = sample_skill().await;
        let tool = SkillTool::new(skill);
        let (name, instructions, resources) = tool.activate().await.unwrap();
        assert_eq!(name, "greeter");
        assert!(instructions.contains("instructions"));
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].path, "scripts/run.sh");
    }

    #[tokio::test]
    async fn load_resource_reads_file_within_skill_dir() {
        let (_dir, skill) = sample_skill().await;
        let tool = SkillTool::new(skill);
        let content = tool.load_resource("scripts/run.sh").await.unwrap();
        assert_eq!(content, "echo hi");
    }

    #[tokio::test]
    async fn load_resource_rejects_directory_traversal() {
        let (_dir, skill) = sample_skill().await;
        let tool = SkillTool::new(skill);
        let result = tool.load_resource("scripts/../../../etc/passwd").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn load_resource_rejects_paths_outside_allowed_subdirs() {
        let (_dir, skill) = sample_skill().await;
        let tool = SkillTool::new(skill);
        let result = tool.load_resource("SKILL.md").await;
        assert!(result.is_err());
    }
}
