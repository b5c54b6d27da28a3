use std::sync::Arc;

use super::{Stage, StageError};
use crate::collab::ImageBackend;
use crate::filter::{ContentFilter, FilterChain};
use crate::job::{Job, StageOutcome, StageQuery};
use crate::tagging::extract_title;

/// Finds or makes an image for jobs whose request names this backend.
pub struct ImageStage {
    query: StageQuery,
    backend: Arc<dyn ImageBackend>,
    filter: FilterChain,
}

impl ImageStage {
    pub fn new(owner: &str, backend: Arc<dyn ImageBackend>, filter: FilterChain) -> Self {
        Self {
            query: StageQuery::image(owner, backend.name()),
            backend,
            filter,
        }
    }
}

impl Stage for ImageStage {
    fn query(&self) -> &StageQuery {
        &self.query
    }

    fn label(&self) -> String {
        format!("image-{}-{}", self.backend.name(), self.query.owner())
    }

    fn process(&self, job: &mut Job) -> Result<StageOutcome, StageError> {
        let fallback = job.generated_text.as_deref().and_then(extract_title);
        let job_id = job.id;

        let request = job
            .image_request
            .as_mut()
            .ok_or_else(|| StageError::InvalidJob(format!("job {} has no image request", job_id)))?;

        if request.backend != self.backend.name() {
            return Err(StageError::InvalidJob(format!(
                "job {} wants backend '{}', not '{}'",
                job_id,
                request.backend,
                self.backend.name()
            )));
        }

        if !request.has_prompt() {
            let title = fallback.ok_or_else(|| {
                StageError::InvalidJob(format!("job {} has no image prompt and no title", job_id))
            })?;
            log::debug!("Job {} image prompt taken from title: {}", job_id, title);
            request.prompt = Some(title);
        }

        let prompt = request.prompt.as_deref().unwrap_or_default();
        if let Some(reason) = self.filter.check(prompt) {
            log::info!("Image prompt for job {} rejected: {}", job_id, reason);
            return Ok(StageOutcome::Rejected(reason));
        }

        match self.backend.find_or_make_image(request, job.image_attempts)? {
            Some(image_ref) => Ok(StageOutcome::image(image_ref)),
            None => {
                log::debug!("Backend {} found no image for job {}", self.backend.name(), job_id);
                Ok(StageOutcome::Empty)
            }
        }
    }
}
