//! Commit plans as submitted by users.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One planned commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitPlan {
    pub files: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub delay_mins: u32,
}

/// A full plan: the target repository and its ordered commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPlan {
    pub repo: String,
    pub commits: Vec<CommitPlan>,
}

impl JobPlan {
    /// Parse and validate a plan from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let plan: JobPlan = serde_json::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("invalid commit plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        self.repo_parts()?;

        if self.commits.is_empty() {
            return Err(Error::InvalidInput(
                "commit plan must contain at least one commit".to_string(),
            ));
        }

        for (index, commit) in self.commits.iter().enumerate() {
            if commit.message.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "commit {} has an empty message",
                    index
                )));
            }
            if commit.files.iter().all(|f| f.trim().is_empty()) {
                return Err(Error::InvalidInput(format!(
                    "commit {} lists no files",
                    index
                )));
            }
        }

        Ok(())
    }

    /// Split `owner/name`.
    pub fn repo_parts(&self) -> Result<(&str, &str)> {
        match self.repo.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok((owner, name))
            }
            _ => Err(Error::InvalidInput(format!(
                "repository must be owner/name, got '{}'",
                self.repo
            ))),
        }
    }
}
