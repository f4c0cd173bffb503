//! Applying a [`ReconcilePlan`] to a live section.
//!
//! The reconstructed list is appended first and the original blocks are
//! deleted afterwards. A failed append leaves the section untouched; a
//! failed delete leaves some originals next to their replacements.

use tracing::{info, instrument, warn};

use chartsync_notion::{CHILDREN_PAGE_SIZE, NotionClient};
use chartsync_shared::{ChartSyncError, DocumentBlock, MismatchPolicy, Result};

use crate::plan::{ReconcilePlan, plan_reconcile};

/// What a reconciliation did (or would do, for a preview).
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub plan: ReconcilePlan,
    /// Blocks in the section before the refresh.
    pub blocks_before: usize,
    /// Section contents after the refresh. For a no-op or a preview this is
    /// the unchanged original listing.
    pub blocks: Vec<DocumentBlock>,
    /// Original blocks deleted.
    pub deleted: usize,
    /// Whether any mutation call was made.
    pub applied: bool,
}

/// Replaces the image blocks of a section with new external images.
#[derive(Clone)]
pub struct DocumentBlockReconciler {
    client: NotionClient,
    policy: MismatchPolicy,
}

impl DocumentBlockReconciler {
    pub fn new(client: NotionClient, policy: MismatchPolicy) -> Self {
        Self { client, policy }
    }

    /// List the section and plan the replacement without mutating anything.
    #[instrument(skip_all, fields(section_id = %section_id, new_images = new_urls.len()))]
    pub async fn preview(&self, section_id: &str, new_urls: &[String]) -> Result<ReconcileOutcome> {
        let listing = self.client.list_children(section_id).await?;
        if listing.has_more {
            warn!(
                listed = listing.blocks.len(),
                "section has more blocks than one page; a real run will refuse it"
            );
        }
        let blocks = listing.blocks;
        let plan = plan_reconcile(&blocks, new_urls, self.policy)?;

        Ok(ReconcileOutcome {
            plan,
            blocks_before: blocks.len(),
            blocks,
            deleted: 0,
            applied: false,
        })
    }

    /// Replace the section's image blocks with `new_urls`, in encounter order.
    #[instrument(skip_all, fields(section_id = %section_id, new_images = new_urls.len()))]
    pub async fn reconcile(&self, section_id: &str, new_urls: &[String]) -> Result<ReconcileOutcome> {
        let listing = self.client.list_children(section_id).await?;
        // Appending a partial listing would move the unlisted tail ahead of it.
        if listing.has_more {
            return Err(ChartSyncError::reconcile(
                format!("GET /v1/blocks/{section_id}/children"),
                format!("section has more than {CHILDREN_PAGE_SIZE} blocks"),
            ));
        }
        let blocks = listing.blocks;
        let blocks_before = blocks.len();
        let plan = plan_reconcile(&blocks, new_urls, self.policy)?;

        if plan.is_noop() {
            info!(blocks = blocks_before, "no image blocks to replace; section left as is");
            return Ok(ReconcileOutcome {
                plan,
                blocks_before,
                blocks,
                deleted: 0,
                applied: false,
            });
        }

        let created = if plan.children.is_empty() {
            Vec::new()
        } else {
            self.client.append_children(section_id, &plan.children).await?
        };

        let mut deleted = 0;
        for block_id in &plan.remove {
            if let Err(e) = self.client.delete_block(block_id).await {
                warn!(
                    appended = created.len(),
                    deleted,
                    remaining = plan.remove.len() - deleted,
                    "delete failed; section holds new blocks plus some originals"
                );
                return Err(e);
            }
            deleted += 1;
        }

        info!(
            blocks_before,
            blocks_after = created.len(),
            slots_filled = plan.slots_filled,
            "section reconciled"
        );

        Ok(ReconcileOutcome {
            plan,
            blocks_before,
            blocks: created,
            deleted,
            applied: true,
        })
    }
}
