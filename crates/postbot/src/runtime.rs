//! Wires a loaded [`Config`] and the outside collaborators into running
//! worker threads.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collab::{ContentVenue, ImageBackend, IncomingFeed, TextGenerator, ToxicityScorer};
use crate::config::{BotConfig, Config};
use crate::error::{Result, WorkerError};
use crate::filter::{FilterChain, ToxicityFilter};
use crate::ingest::{Ingestor, SubmissionScheduler};
use crate::store::JobStore;
use crate::worker::{
    ImageStage, ReplyPublisher, Stage, StageWorker, SubmissionPublisher, TextStage, Ticker,
    WorkerPool,
};

/// The outside services one bot talks to.
#[derive(Clone)]
pub struct BotCollaborators {
    pub venue: Arc<dyn ContentVenue>,
    pub feed: Arc<dyn IncomingFeed>,
    pub generator: Arc<dyn TextGenerator>,
    pub image_backends: Vec<Arc<dyn ImageBackend>>,
    /// Without a scorer only keyword filtering applies.
    pub toxicity: Option<Arc<dyn ToxicityScorer>>,
}

/// Starts every worker, ingestor and scheduler for every configured bot.
///
/// `collaborators` is keyed by bot username, case-insensitively.
pub fn start(
    config: &Config,
    store: JobStore,
    collaborators: &HashMap<String, BotCollaborators>,
) -> Result<WorkerPool> {
    let store = store.with_budgets(config.retry_budgets);
    let mut pool = WorkerPool::new(config.worker.schedule());

    let by_name: HashMap<String, &BotCollaborators> = collaborators
        .iter()
        .map(|(name, c)| (name.to_lowercase(), c))
        .collect();

    for bot in &config.bots {
        let Some(collab) = by_name.get(&bot.username.to_lowercase()) else {
            pool.wait();
            return Err(WorkerError::MissingCollaborators(bot.username.clone()).into());
        };

        if let Err(e) = start_bot(&mut pool, config, bot, &store, collab) {
            pool.wait();
            return Err(e);
        }
    }

    log::info!(
        "Started {} workers for {} bots",
        pool.len(),
        config.bots.len()
    );
    Ok(pool)
}

fn start_bot(
    pool: &mut WorkerPool,
    config: &Config,
    bot: &BotConfig,
    store: &JobStore,
    collab: &BotCollaborators,
) -> Result<()> {
    let owner = bot.username.as_str();
    let worker_ticker = pool.ticker();
    let ingest_ticker = pool.ticker().with_schedule(config.ingest.schedule());

    let mut filter = FilterChain::new().with(Arc::new(bot.keyword_filter()));
    if let Some(scorer) = &collab.toxicity {
        let toxicity = ToxicityFilter::new(scorer.clone()).with_thresholds(&bot.toxicity_thresholds);
        filter = filter.with(Arc::new(toxicity));
    }

    pool.spawn_stage(tuned(
        TextStage::new(owner, collab.generator.clone(), filter.clone()),
        store,
        &worker_ticker,
        config,
    ))?;

    for backend in &collab.image_backends {
        pool.spawn_stage(tuned(
            ImageStage::new(owner, backend.clone(), filter.clone()),
            store,
            &worker_ticker,
            config,
        ))?;
    }
    if bot.image_post_frequency > 0.0
        && !collab
            .image_backends
            .iter()
            .any(|b| b.name() == bot.image_backend)
    {
        log::warn!(
            "{}: no '{}' image backend, link posts will wait forever for images",
            owner,
            bot.image_backend
        );
    }

    pool.spawn_stage(tuned(
        ReplyPublisher::new(owner, collab.venue.clone(), store.clone()),
        store,
        &worker_ticker,
        config,
    ))?;

    pool.spawn_stage(tuned(
        SubmissionPublisher::new(owner, collab.venue.clone(), store.clone())
            .with_flair_ids(&bot.flair_ids)
            .with_nsfw(bot.nsfw),
        store,
        &worker_ticker,
        config,
    ))?;

    let ingestor = Ingestor::new(
        owner,
        store.clone(),
        collab.feed.clone(),
        bot.reply_scorer(),
        ingest_ticker.clone(),
    )
    .with_tags(bot.tag_formatter())
    .with_text_params(bot.text_params.clone())
    .with_inbox_replies(bot.inbox_replies);
    pool.spawn(format!("ingest-{}", owner), move || ingestor.run())?;

    if !bot.new_post_schedule.is_empty() {
        let scheduler = SubmissionScheduler::new(
            owner,
            store.clone(),
            bot.new_post_schedule.clone(),
            ingest_ticker,
        )
        .with_tags(bot.tag_formatter())
        .with_text_params(bot.text_params.clone())
        .with_images(
            bot.image_post_frequency,
            bot.image_backend.clone(),
            bot.image_search_prefix.clone(),
        );
        pool.spawn(format!("schedule-{}", owner), move || scheduler.run())?;
    }

    Ok(())
}

fn tuned<S: Stage>(stage: S, store: &JobStore, ticker: &Ticker, config: &Config) -> StageWorker<S> {
    StageWorker::new(stage, store.clone(), ticker.clone())
        .with_batch_size(config.worker.batch_size)
        .with_policy(config.worker.failure_policy())
}
