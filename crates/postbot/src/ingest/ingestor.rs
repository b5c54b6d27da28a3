use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::IngestError;
use crate::collab::{IncomingFeed, ItemKind, ReplyScorer, ThreadNode};
use crate::error::StoreError;
use crate::job::{NewJob, TextParams, TextRequest};
use crate::store::JobStore;
use crate::tagging::{remove_username_mentions, TagFormatter};
use crate::worker::Ticker;

/// Tally of one ingest pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Items with a text job created for them.
    pub queued: usize,
    /// Items recorded without a reply.
    pub passed: usize,
    /// Items already in the ledger.
    pub known: usize,
    /// Items that could not or may not be answered. Not recorded.
    pub skipped: usize,
}

/// Turns incoming items into jobs for one bot.
pub struct Ingestor {
    owner: String,
    store: JobStore,
    feed: Arc<dyn IncomingFeed>,
    scorer: Arc<dyn ReplyScorer>,
    tags: TagFormatter,
    text_params: TextParams,
    inbox_replies: bool,
    rng: StdRng,
    ticker: Ticker,
    /// Polled items not yet recorded. The feed hands each item out once.
    backlog: VecDeque<ThreadNode>,
}

impl Ingestor {
    pub fn new(
        owner: impl Into<String>,
        store: JobStore,
        feed: Arc<dyn IncomingFeed>,
        scorer: Arc<dyn ReplyScorer>,
        ticker: Ticker,
    ) -> Self {
        Self {
            owner: owner.into(),
            store,
            feed,
            scorer,
            tags: TagFormatter::default(),
            text_params: TextParams::default(),
            inbox_replies: false,
            rng: StdRng::from_entropy(),
            ticker,
            backlog: VecDeque::new(),
        }
    }

    pub fn with_tags(mut self, tags: TagFormatter) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_text_params(mut self, params: TextParams) -> Self {
        self.text_params = params;
        self
    }

    pub fn with_inbox_replies(mut self, enabled: bool) -> Self {
        self.inbox_replies = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Prompt asking the model to answer `node` as this bot.
    pub fn prompt_for(&self, node: &ThreadNode) -> String {
        let history = remove_username_mentions(&self.tags.collate_history(node), &self.owner);
        history + &self.tags.reply_tag(node, &self.owner)
    }

    /// Items polled but not yet recorded.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Records every new incoming item, asking for a reply to some of them.
    ///
    /// Polled items wait in a backlog until they are recorded. A store
    /// error stops the pass with the failing item still at the front, and
    /// the next pass resumes there. A feed error is reported after the
    /// backlog has been worked through.
    pub fn ingest(&mut self) -> Result<IngestReport, IngestError> {
        let polled = self
            .feed
            .poll_incoming()
            .map(|items| self.backlog.extend(items));
        let mut report = IngestReport::default();

        while let Some(node) = self.backlog.pop_front() {
            if let Err(e) = self.consider(&node, &mut report) {
                self.backlog.push_front(node);
                log::warn!(
                    "{}: {} polled item(s) held for the next pass",
                    self.owner,
                    self.backlog.len()
                );
                return Err(e);
            }
        }

        polled?;
        Ok(report)
    }

    fn consider(
        &mut self,
        node: &ThreadNode,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        if self.store.find_by_source(&self.owner, &node.id)?.is_some() {
            report.known += 1;
            return Ok(());
        }
        if node.kind == ItemKind::Message && !self.inbox_replies {
            report.skipped += 1;
            return Ok(());
        }
        if !node.can_reply() {
            log::debug!("{}: skipping {}, it cannot be replied to", self.owner, node.id);
            report.skipped += 1;
            return Ok(());
        }

        let probability = self.scorer.reply_probability(node);
        let reply = self.rng.gen::<f64>() < probability;

        let mut new = NewJob::for_item(&self.owner, &node.id);
        if !node.subject.is_empty() {
            new = new.with_subject(&node.subject);
        }
        if reply {
            let request =
                TextRequest::new(self.prompt_for(node)).with_params(self.text_params.clone());
            new = new.with_text_request(request);
        }

        match self.store.create(new) {
            Ok(job) if reply => {
                log::info!(
                    "{}: queued reply job {} for {} (p={:.2})",
                    self.owner,
                    job.id,
                    node.id,
                    probability
                );
                report.queued += 1;
            }
            Ok(_) => report.passed += 1,
            Err(StoreError::Duplicate { .. }) => report.known += 1,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Records the bot's own recent items, and what they answer, so they
    /// are never answered later. Returns how many items were new.
    pub fn sync_own_items(&self) -> Result<usize, IngestError> {
        let mut recorded = 0;
        for node in self.feed.own_recent()? {
            if self.store.record_seen(&self.owner, &node.id)? {
                recorded += 1;
            }
            if let Some(parent) = node.parent() {
                if self.store.record_seen(&self.owner, &parent.id)? {
                    recorded += 1;
                }
            }
        }

        log::info!("{}: synced own items, {} new", self.owner, recorded);
        Ok(recorded)
    }

    /// Syncs once, then ingests until shutdown.
    pub fn run(mut self) {
        let span = tracing::info_span!("ingest", owner = self.owner.as_str());
        let _entered = span.enter();

        if let Err(e) = self.sync_own_items() {
            log::error!("{}: failed to sync own items: {}", self.owner, e);
        }

        loop {
            match self.ingest() {
                Ok(report) => log::debug!("{}: ingest {:?}", self.owner, report),
                Err(e) => log::error!("{}: ingest failed: {}", self.owner, e),
            }
            if !self.ticker.wait_poll() {
                break;
            }
        }

        log::info!("{} ingestor stopped", self.owner);
    }
}
