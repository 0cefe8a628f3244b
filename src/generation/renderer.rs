//! Asset rendering behind a trait seam.
//!
//! The pipeline only needs `render(trait selection) -> (image, metadata)`;
//! the compositing mechanics live outside this crate. The production
//! implementation shells out to the generator binary under an explicit
//! contract: structured argv, bounded timeout, captured stderr, and
//! exit-code-to-error mapping.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::selector::SelectionOutcome;
use crate::domain::RarityTier;
use crate::error::ForgeError;

/// ERC-721 style token metadata produced by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftMetadata {
    /// Token display name, e.g. `"Plumffel #42"`.
    pub name: String,
    /// Collection description.
    pub description: String,
    /// Image reference. Rewritten to the uploaded URL before the
    /// metadata itself is uploaded.
    pub image: String,
    /// Trait attributes in marketplace-standard shape.
    pub attributes: Vec<MetadataAttribute>,
}

/// One `trait_type`/`value` attribute pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataAttribute {
    /// Attribute category (layer name or `"Rarity"`).
    pub trait_type: String,
    /// Attribute value.
    pub value: String,
}

impl NftMetadata {
    /// Builds metadata directly from a selection, with a placeholder
    /// image reference. Used when the generator delegates metadata
    /// authoring to the pipeline.
    #[must_use]
    pub fn for_token(token_id: u64, tier: RarityTier, selection: &SelectionOutcome) -> Self {
        let mut attributes: Vec<MetadataAttribute> = selection
            .traits
            .iter()
            .map(|t| MetadataAttribute {
                trait_type: t.layer.clone(),
                value: t.trait_name.clone(),
            })
            .collect();
        attributes.push(MetadataAttribute {
            trait_type: "Rarity".to_string(),
            value: tier.name().to_string(),
        });
        Self {
            name: format!("Plumffel #{token_id}"),
            description: "A procedurally generated Plumffel.".to_string(),
            image: String::new(),
            attributes,
        }
    }
}

/// Result of a successful render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Local path of the rendered image.
    pub image_path: PathBuf,
    /// Parsed metadata; image reference still local or placeholder.
    pub metadata: NftMetadata,
    /// Per-job scratch directory; removed best-effort after upload.
    pub workdir: PathBuf,
}

/// Rendering capability consumed by the job service.
#[async_trait]
pub trait AssetRenderer: Send + Sync + fmt::Debug {
    /// Composites the selected traits into an image plus metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Render`] on any generator failure; the
    /// message is captured verbatim into the failing job.
    async fn render(
        &self,
        token_id: u64,
        tier: RarityTier,
        selection: &SelectionOutcome,
    ) -> Result<RenderOutput, ForgeError>;
}

/// Input document handed to the generator subprocess.
#[derive(Debug, Serialize)]
struct GeneratorInput<'a> {
    token_id: u64,
    rarity_level: u8,
    rarity_name: &'static str,
    dna: &'a str,
    traits: &'a [super::selector::SelectedTrait],
}

/// Generator subprocess with an explicit contract.
///
/// Invocation: `<command> --input <job_dir>/input.json --output <job_dir>`.
/// The generator must write `<job_dir>/<token_id>.png` and
/// `<job_dir>/<token_id>.json`, exit 0 within the timeout, and report
/// failures on stderr. No shell is involved; argv is built structurally.
#[derive(Debug, Clone)]
pub struct SubprocessRenderer {
    command: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
}

impl SubprocessRenderer {
    /// Creates a renderer driving `command`, writing scratch output under
    /// `workdir`, killing the generator after `timeout`.
    #[must_use]
    pub fn new(command: PathBuf, workdir: PathBuf, timeout: Duration) -> Self {
        Self {
            command,
            workdir,
            timeout,
        }
    }

    fn job_dir(&self, token_id: u64) -> PathBuf {
        self.workdir.join(format!("token_{token_id}"))
    }
}

#[async_trait]
impl AssetRenderer for SubprocessRenderer {
    async fn render(
        &self,
        token_id: u64,
        tier: RarityTier,
        selection: &SelectionOutcome,
    ) -> Result<RenderOutput, ForgeError> {
        let job_dir = self.job_dir(token_id);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| ForgeError::Render(format!("cannot create scratch dir: {e}")))?;

        let input = GeneratorInput {
            token_id,
            rarity_level: tier.level(),
            rarity_name: tier.name(),
            dna: &selection.dna,
            traits: &selection.traits,
        };
        let input_path = job_dir.join("input.json");
        let input_json = serde_json::to_vec_pretty(&input)
            .map_err(|e| ForgeError::Render(format!("cannot encode generator input: {e}")))?;
        tokio::fs::write(&input_path, input_json)
            .await
            .map_err(|e| ForgeError::Render(format!("cannot write generator input: {e}")))?;

        let child = tokio::process::Command::new(&self.command)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&job_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ForgeError::Render(format!(
                    "cannot start generator {}: {e}",
                    self.command.display()
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ForgeError::Render(format!(
                    "renderer timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ForgeError::Render(format!("generator I/O error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let cause = stderr.trim();
            return Err(match output.status.code() {
                Some(code) if cause.is_empty() => {
                    ForgeError::Render(format!("renderer exited with status {code}"))
                }
                Some(code) => ForgeError::Render(format!(
                    "renderer exited with status {code}: {cause}"
                )),
                None => ForgeError::Render("renderer killed by signal".to_string()),
            });
        }

        let image_path = job_dir.join(format!("{token_id}.png"));
        let metadata_path = job_dir.join(format!("{token_id}.json"));
        if !image_path.exists() {
            return Err(ForgeError::Render(format!(
                "renderer produced no image at {}",
                image_path.display()
            )));
        }
        let metadata = read_metadata(&metadata_path).await?;

        Ok(RenderOutput {
            image_path,
            metadata,
            workdir: job_dir,
        })
    }
}

async fn read_metadata(path: &Path) -> Result<NftMetadata, ForgeError> {
    let raw = tokio::fs::read(path).await.map_err(|e| {
        ForgeError::Render(format!("renderer produced no metadata at {}: {e}", path.display()))
    })?;
    serde_json::from_slice(&raw)
        .map_err(|e| ForgeError::Render(format!("corrupt metadata from renderer: {e}")))
}
