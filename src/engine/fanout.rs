// ABOUTME: Page fan-out policy turning one task's page list into per-page successors
// ABOUTME: Skips descriptors without a page number and preserves input order

use serde_json::Value;
use tracing::warn;

use super::context::{PageDescriptor, TaskContext};
use super::params::{Entities, PipelineParameters, TaskParameters};
use crate::parser::TaskConfig;

/// One successor per valid page descriptor, bound to `next`.
///
/// Every successor gets its own copy of `context` and `entities` so that
/// siblings share no mutable state.
pub fn expand_for_pages(
    seed: &PipelineParameters,
    next: &TaskConfig,
    pages: &[Value],
    context: &TaskContext,
    entities: &Entities,
) -> Vec<TaskParameters> {
    let mut successors = Vec::with_capacity(pages.len());

    for (index, entry) in pages.iter().enumerate() {
        let page = match parse_page(entry) {
            Some(page) => page,
            None => {
                warn!(
                    "Skipping page entry {} for task '{}' in run {}: no page number",
                    index, next.id, seed.run_id
                );
                continue;
            }
        };

        let page_number = page.page_number;
        let mut page_context = context.clone();
        page_context.set_page(page);

        successors.push(seed.bind_with(
            next.clone(),
            page_number,
            page_context,
            entities.clone(),
        ));
    }

    successors
}

fn parse_page(entry: &Value) -> Option<PageDescriptor> {
    if !entry.is_object() {
        return None;
    }
    serde_json::from_value::<PageDescriptor>(entry.clone())
        .ok()
        .filter(|page| page.page_number.is_some())
}
