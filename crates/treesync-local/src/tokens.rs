use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use treesync_core::AccessControl;

/// Prefix marking an allow-list entry that stores a token digest.
const DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, thiserror::Error)]
pub enum TokenFileError {
    #[error("Failed to read token file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: invalid sha256 digest")]
    InvalidDigest { line: usize },
}

/// Bearer-token allow-list loaded from a text file.
///
/// One entry per line, either the token itself or `sha256:<hex digest>`.
/// Blank lines and lines starting with `#` are ignored. Only digests are
/// kept in memory.
#[derive(Debug, Default, Clone)]
pub struct TokenFile {
    digests: HashSet<String>,
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl TokenFile {
    pub async fn load(path: &Path) -> Result<Self, TokenFileError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TokenFileError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let tokens = Self::parse(&contents)?;
        debug!("Loaded {} tokens from {}", tokens.len(), path.display());
        Ok(tokens)
    }

    pub fn parse(contents: &str) -> Result<Self, TokenFileError> {
        let mut digests = HashSet::new();
        for (index, line) in contents.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }

            let digest = match entry.strip_prefix(DIGEST_PREFIX) {
                Some(hex_digest) => {
                    let valid = hex::decode(hex_digest)
                        .map(|bytes| bytes.len() == 32)
                        .unwrap_or(false);
                    if !valid {
                        return Err(TokenFileError::InvalidDigest { line: index + 1 });
                    }
                    hex_digest.to_ascii_lowercase()
                }
                None => hash_token(entry),
            };
            digests.insert(digest);
        }
        Ok(Self { digests })
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: tokens
                .into_iter()
                .map(|token| hash_token(token.as_ref()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl AccessControl for TokenFile {
    fn has_access(&self, token: &str) -> bool {
        !token.is_empty() && self.digests.contains(&hash_token(token))
    }
}
