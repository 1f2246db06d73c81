//! Branch protection rules applied through the GitHub API

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PrequelError;

/// GitHub accepts at most six required approving reviews.
pub const MAX_REQUIRED_REVIEWERS: u8 = 6;

fn default_true() -> bool {
    true
}

fn default_reviewers() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchProtectionRules {
    #[serde(default = "default_true")]
    pub require_pull_request: bool,
    #[serde(default = "default_reviewers")]
    pub required_reviewers: u8,
    #[serde(default)]
    pub dismiss_stale_reviews: bool,
    #[serde(default)]
    pub require_code_owners: bool,
}

impl Default for BranchProtectionRules {
    fn default() -> Self {
        Self {
            require_pull_request: true,
            required_reviewers: default_reviewers(),
            dismiss_stale_reviews: false,
            require_code_owners: false,
        }
    }
}

impl BranchProtectionRules {
    pub fn validate(&self) -> Result<(), PrequelError> {
        if self.required_reviewers > MAX_REQUIRED_REVIEWERS {
            return Err(PrequelError::ValidationError(format!(
                "requiredReviewers must be between 0 and {}, got {}",
                MAX_REQUIRED_REVIEWERS, self.required_reviewers
            )));
        }
        if !self.require_pull_request && (self.dismiss_stale_reviews || self.require_code_owners) {
            return Err(PrequelError::ValidationError(
                "Review rules need requirePullRequest".to_string(),
            ));
        }
        Ok(())
    }

    /// Body for `PUT /repos/{owner}/{repo}/branches/{branch}/protection`. GitHub requires
    /// every top-level key, with `null` meaning "not enforced".
    pub fn to_request(&self) -> Value {
        let reviews = self.require_pull_request.then(|| {
            json!({
                "dismiss_stale_reviews": self.dismiss_stale_reviews,
                "require_code_owner_reviews": self.require_code_owners,
                "required_approving_review_count": self.required_reviewers,
            })
        });

        json!({
            "required_status_checks": null,
            "enforce_admins": null,
            "required_pull_request_reviews": reviews,
            "restrictions": null,
        })
    }
}
