// Command-line planning for a new terminal session.

use std::path::Path;

/// How the interactive program is started for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    /// Continue the conversation recorded under `token`.
    Resume { token: String },
    /// Start a new conversation under a freshly minted `token`, seeded
    /// with an opening instruction.
    Fresh { token: String, prompt: String },
    /// No track context: plain program.
    Bare,
}

impl LaunchPlan {
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Resume { token } => vec!["--resume".into(), token.clone()],
            Self::Fresh { token, prompt } => {
                vec!["--session-id".into(), token.clone(), prompt.clone()]
            }
            Self::Bare => Vec::new(),
        }
    }

}

/// Opening instruction for a track. Brand-new tracks get asked about
/// first; existing tracks are opened for editing.
pub fn opening_prompt(guide_file: &str, track_path: &str, is_new: bool) -> String {
    if is_new {
        format!(
            "Read {guide_file} for reference. The file {track_path} is a newly created empty \
             track. Ask me what kind of music I want to create before writing anything."
        )
    } else {
        format!(
            "Read {guide_file} for reference, then read {track_path} and help me edit this \
             Strudel track."
        )
    }
}

/// A track counts as new while it is still about the size of its starter
/// content. Unreadable metadata counts as existing.
pub async fn is_new_track(path: &Path, max_bytes: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len() < max_bytes,
        Err(_) => false,
    }
}
