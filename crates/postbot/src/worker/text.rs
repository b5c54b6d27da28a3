use std::sync::Arc;

use super::{Stage, StageError};
use crate::collab::TextGenerator;
use crate::filter::{ContentFilter, FilterChain};
use crate::job::{Job, StageOutcome, StageQuery};
use crate::tagging::{extract_title, has_end_tag_after};

/// Continues each job's prompt with the text model.
pub struct TextStage {
    query: StageQuery,
    generator: Arc<dyn TextGenerator>,
    filter: FilterChain,
}

impl TextStage {
    pub fn new(owner: &str, generator: Arc<dyn TextGenerator>, filter: FilterChain) -> Self {
        Self {
            query: StageQuery::text(owner),
            generator,
            filter,
        }
    }
}

impl Stage for TextStage {
    fn query(&self) -> &StageQuery {
        &self.query
    }

    fn process(&self, job: &mut Job) -> Result<StageOutcome, StageError> {
        let request = job
            .text_request
            .as_ref()
            .ok_or_else(|| StageError::InvalidJob(format!("job {} has no text request", job.id)))?;

        let Some(generated) = self.generator.generate(&request.prompt, &request.params)? else {
            log::debug!("No text generated for job {}", job.id);
            return Ok(StageOutcome::Empty);
        };

        let Some(written) = generated.strip_prefix(request.prompt.as_str()) else {
            log::warn!("Generated text for job {} does not echo its prompt, discarding", job.id);
            return Ok(StageOutcome::Empty);
        };

        let usable = if job.is_new_content() {
            extract_title(&generated).is_some()
        } else {
            has_end_tag_after(&request.prompt, &generated)
        };
        if !usable {
            log::info!("Generated text for job {} is incomplete, discarding", job.id);
            return Ok(StageOutcome::Empty);
        }

        if let Some(reason) = self.filter.check(written) {
            log::info!("Generated text for job {} rejected: {}", job.id, reason);
            return Ok(StageOutcome::Rejected(reason));
        }

        Ok(StageOutcome::text(generated))
    }
}
