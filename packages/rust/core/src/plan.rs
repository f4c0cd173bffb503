//! Reconciliation planning: which blocks to append and which to remove.
//!
//! Pure function over a listed section. Non-image blocks keep their index;
//! new images fill the old image positions in encounter order.

use std::collections::VecDeque;

use tracing::{debug, warn};

use chartsync_shared::{BlockSpec, ChartSyncError, DocumentBlock, MismatchPolicy, Result};

/// Block kinds the append API cannot recreate. Deleting them would lose
/// content (or archive a sub-page), so sections holding them are refused.
pub const NON_RECREATABLE_KINDS: &[&str] = &[
    "child_page",
    "child_database",
    "link_to_page",
    "synced_block",
    "template",
    "unsupported",
];

/// Most children the append API accepts in one call.
pub const MAX_APPEND_CHILDREN: usize = 100;

/// Name used for planning failures in [`ChartSyncError::Reconcile`].
const PLAN_CALL: &str = "plan reconcile";

/// Outcome of planning a section refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    /// Reconstructed section, in final order.
    pub children: Vec<BlockSpec>,
    /// Every original block id, in section order.
    pub remove: Vec<String>,
    /// Image slots that received a new image.
    pub slots_filled: usize,
    /// Image slots left without a new image (dropped under lenient policy).
    pub slots_dropped: usize,
    /// New images without a slot (appended under lenient policy).
    pub surplus_appended: usize,
}

impl ReconcilePlan {
    /// Nothing to replace: no image blocks and no new images.
    pub fn is_noop(&self) -> bool {
        self.slots_filled == 0 && self.slots_dropped == 0 && self.surplus_appended == 0
    }
}

/// Plan the replacement of `blocks`' images with `new_urls`.
pub fn plan_reconcile(
    blocks: &[DocumentBlock],
    new_urls: &[String],
    policy: MismatchPolicy,
) -> Result<ReconcilePlan> {
    let mut slotted: Vec<Option<BlockSpec>> = vec![None; blocks.len()];
    let mut slots: VecDeque<usize> = VecDeque::new();
    let mut remove = Vec::with_capacity(blocks.len());

    for (index, block) in blocks.iter().enumerate() {
        remove.push(block.id.clone());

        if block.is_image() {
            slots.push_back(index);
            continue;
        }

        if NON_RECREATABLE_KINDS.contains(&block.kind.as_str()) {
            return Err(ChartSyncError::reconcile(
                PLAN_CALL,
                format!(
                    "block {} at position {index} is a '{}' block, which cannot be recreated",
                    block.id, block.kind
                ),
            ));
        }
        if block.has_children {
            warn!(block_id = %block.id, kind = %block.kind, "nested children will not be carried over");
        }
        slotted[index] = Some(BlockSpec::preserve(block));
    }

    if policy == MismatchPolicy::Strict && slots.len() != new_urls.len() {
        return Err(ChartSyncError::reconcile(
            PLAN_CALL,
            format!(
                "section has {} image block(s) but {} new image(s) were supplied",
                slots.len(),
                new_urls.len()
            ),
        ));
    }

    let mut slots_filled = 0;
    let mut surplus = Vec::new();
    for url in new_urls {
        let image = BlockSpec::ExternalImage { url: url.clone() };
        match slots.pop_front() {
            Some(index) => {
                slotted[index] = Some(image);
                slots_filled += 1;
            }
            None => surplus.push(image),
        }
    }

    let slots_dropped = slots.len();
    let surplus_appended = surplus.len();
    let mut children: Vec<BlockSpec> = slotted.into_iter().flatten().collect();
    children.extend(surplus);

    if children.len() > MAX_APPEND_CHILDREN {
        return Err(ChartSyncError::reconcile(
            PLAN_CALL,
            format!(
                "{} blocks exceed the append limit of {MAX_APPEND_CHILDREN}",
                children.len()
            ),
        ));
    }

    debug!(
        blocks = blocks.len(),
        slots_filled, slots_dropped, surplus_appended, "reconcile planned"
    );

    Ok(ReconcilePlan {
        children,
        remove,
        slots_filled,
        slots_dropped,
        surplus_appended,
    })
}
