//! One download's state machine and its transfer run.
//!
//! Every transition happens under the job's info lock and its event is sent
//! before the lock is released, so the delivery thread sees transitions in the
//! order they were made.

use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::control::JobControl;
use super::event::{Event, Persist};
use super::pool::{TransferContext, WorkerPool};
use crate::listener::DownloadObserver;
use crate::record::{unix_millis, DownloadInfo, DownloadState};
use crate::storage::StorageWriter;
use crate::transfer::{self, ChunkSink, Outcome, ResponseHead, TransferError};

pub(crate) struct Job {
    key: String,
    info: Mutex<DownloadInfo>,
    control: JobControl,
    events: Sender<Event>,
}

impl Job {
    pub(crate) fn new(info: DownloadInfo, events: Sender<Event>) -> Arc<Self> {
        Arc::new(Self {
            key: info.key.clone(),
            info: Mutex::new(info),
            control: JobControl::default(),
            events,
        })
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub(crate) fn snapshot(&self) -> DownloadInfo {
        self.lock().clone()
    }

    pub(crate) fn state(&self) -> DownloadState {
        self.lock().state
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == DownloadState::Running
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.control.is_deleted()
    }

    fn lock(&self) -> MutexGuard<'_, DownloadInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::trace!(key = %self.key, "delivery thread gone; event dropped");
        }
    }

    /// Caller holds the info lock (`info` is the guarded value).
    fn transition(self: &Arc<Self>, info: &mut DownloadInfo, state: DownloadState, persist: Persist) {
        info.state = state;
        self.emit(Event::State {
            job: Arc::clone(self),
            info: info.clone(),
            persist,
        });
    }

    /// Attach `observer`. With `replay` it first receives the current state.
    pub(crate) fn subscribe(self: &Arc<Self>, observer: Arc<dyn DownloadObserver>, replay: bool) {
        let info = self.lock();
        self.emit(Event::Subscribe {
            job: Arc::clone(self),
            observer,
            replay: replay.then_some(info.state),
        });
    }

    /// Queue the job for a transfer run. False if it is already running or
    /// already queued and not paused.
    pub(crate) fn resume(self: &Arc<Self>, pool: &WorkerPool) -> bool {
        let mut info = self.lock();
        if self.control.is_deleted() || info.state == DownloadState::Running {
            return false;
        }
        if info.state == DownloadState::Waiting
            && self.control.is_queued()
            && !self.control.is_paused()
        {
            return false;
        }
        self.control.clear_pause();
        self.transition(&mut info, DownloadState::Waiting, Persist::None);
        if self.control.mark_queued() && !pool.submit(Arc::clone(self)) {
            self.control.mark_dequeued();
            tracing::warn!(key = %self.key, "worker pool closed; job not queued");
        }
        true
    }

    /// Ask a running transfer to stop at the next chunk boundary. A job still
    /// waiting for a worker is paused on the spot.
    pub(crate) fn pause(self: &Arc<Self>) {
        let mut info = self.lock();
        self.control.request_pause();
        if info.state == DownloadState::Waiting {
            self.transition(&mut info, DownloadState::Paused, Persist::Upsert);
        }
    }

    /// Mark deleted. A queued or running run exits without further events.
    pub(crate) fn delete(&self) {
        let _info = self.lock();
        self.control.request_delete();
    }

    /// Worker entry point.
    pub(crate) fn run(self: &Arc<Self>, ctx: &TransferContext) {
        let start = {
            let mut info = self.lock();
            self.control.mark_dequeued();
            if self.control.is_deleted() {
                tracing::debug!(key = %self.key, "dequeued after delete");
                return;
            }
            if self.control.is_paused() {
                if info.state != DownloadState::Paused {
                    self.transition(&mut info, DownloadState::Paused, Persist::Upsert);
                }
                return;
            }
            self.transition(&mut info, DownloadState::Running, Persist::None);
            self.emit(Event::Progress {
                job: Arc::clone(self),
                finished: info.finished_length,
                total: info.content_length,
            });
            for interceptor in ctx.interceptors().iter() {
                interceptor.intercept(&mut info);
            }
            self.emit(Event::Checkpoint {
                job: Arc::clone(self),
                info: info.clone(),
                persist: Persist::InsertIfAbsent,
            });
            info.clone()
        };

        tracing::info!(key = %self.key, url = %start.url, offset = start.finished_length, "download started");
        let result = self.transfer(&start, ctx);

        let mut info = self.lock();
        if self.control.is_deleted() {
            tracing::debug!(key = %self.key, "deleted during transfer");
            return;
        }
        match result {
            Ok(Outcome::Completed) => {
                info.finish_time = Some(unix_millis());
                self.transition(&mut info, DownloadState::Finished, Persist::Update);
                tracing::info!(key = %self.key, bytes = info.finished_length, "download finished");
            }
            Ok(Outcome::Stopped) => {
                self.transition(&mut info, DownloadState::Paused, Persist::Update);
                tracing::info!(key = %self.key, at = info.finished_length, "download paused");
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "download failed");
                self.transition(&mut info, DownloadState::Failed, Persist::Update);
            }
        }
    }

    fn transfer(self: &Arc<Self>, start: &DownloadInfo, ctx: &TransferContext) -> Result<Outcome, TransferError> {
        if start.content_length > 0 && start.finished_length >= start.content_length {
            tracing::debug!(key = %self.key, "already complete; no request");
            return Ok(Outcome::Completed);
        }
        let range_start = (start.finished_length > 0 && start.content_length > 0)
            .then_some(start.finished_length);
        let range = range_start.map(|s| (s, start.content_length - 1));

        let mut sink = JobSink {
            job: self,
            path: &start.path,
            range_start,
            known_length: start.content_length,
            writer: None,
            offset: start.finished_length,
            total: start.content_length,
        };
        let outcome = transfer::fetch(&start.url, range, &ctx.settings, &mut sink)?;
        if outcome == Outcome::Completed {
            if let Some(writer) = &sink.writer {
                writer.sync()?;
            }
            if sink.offset != sink.total {
                return Err(TransferError::Partial {
                    expected: sink.total,
                    received: sink.offset,
                });
            }
        }
        Ok(outcome)
    }

    fn record_progress(self: &Arc<Self>, finished: u64, total: u64) {
        let mut info = self.lock();
        info.finished_length = finished;
        info.content_length = total;
        self.emit(Event::Progress {
            job: Arc::clone(self),
            finished,
            total,
        });
    }
}

/// Writes one response body into the job's file and reports progress.
struct JobSink<'a> {
    job: &'a Arc<Job>,
    path: &'a Path,
    range_start: Option<u64>,
    known_length: u64,
    writer: Option<StorageWriter>,
    offset: u64,
    total: u64,
}

impl ChunkSink for JobSink<'_> {
    fn on_response(&mut self, head: &ResponseHead) -> Result<(), TransferError> {
        let resolved = transfer::resolve(head, self.range_start, self.known_length)?;
        let writer = StorageWriter::open(self.path)?;
        if resolved.restarted {
            tracing::info!(key = %self.job.key, status = head.status, "range not honoured; restarting from zero");
            writer.truncate(0)?;
        }
        self.writer = Some(writer);
        self.offset = resolved.offset;
        self.total = resolved.content_length;
        self.job.record_progress(self.offset, self.total);
        Ok(())
    }

    fn keep_going(&self) -> bool {
        !self.job.control.should_stop()
    }

    fn on_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let writer = self.writer.as_ref().ok_or(TransferError::NoContentLength)?;
        let end = self.offset + data.len() as u64;
        if end > self.total {
            return Err(TransferError::Overflow {
                expected: self.total,
            });
        }
        writer.write_at(self.offset, data)?;
        self.offset = end;
        self.job.record_progress(self.offset, self.total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn job_in(state: DownloadState) -> (Arc<Job>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let mut info = DownloadInfo::new(1, "http://127.0.0.1:9/a.bin", "a.bin", "/tmp/a.bin", None, None);
        info.state = state;
        (Job::new(info, tx), rx)
    }

    fn states(rx: &mpsc::Receiver<Event>) -> Vec<(DownloadState, Persist)> {
        rx.try_iter()
            .filter_map(|e| match e {
                Event::State { info, persist, .. } => Some((info.state, persist)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pause_while_waiting_is_immediate() {
        let (job, rx) = job_in(DownloadState::Waiting);
        job.pause();
        assert_eq!(job.state(), DownloadState::Paused);
        assert_eq!(states(&rx), vec![(DownloadState::Paused, Persist::Upsert)]);
    }

    #[test]
    fn pause_of_idle_job_only_sets_flag() {
        let (job, rx) = job_in(DownloadState::Failed);
        job.pause();
        assert_eq!(job.state(), DownloadState::Failed);
        assert!(states(&rx).is_empty());
        assert!(job.control.is_paused());
    }

    #[test]
    fn dequeued_paused_job_exits_without_duplicate_event() {
        let (job, rx) = job_in(DownloadState::Waiting);
        job.control.mark_queued();
        job.pause();
        job.run(&TransferContext::default());
        assert_eq!(states(&rx), vec![(DownloadState::Paused, Persist::Upsert)]);
        assert!(!job.control.is_queued());
    }

    #[test]
    fn dequeued_deleted_job_is_silent() {
        let (job, rx) = job_in(DownloadState::Waiting);
        job.control.mark_queued();
        job.delete();
        job.run(&TransferContext::default());
        assert!(rx.try_iter().next().is_none());
        assert!(job.is_deleted());
    }

    #[test]
    fn complete_record_finishes_without_request() {
        let (job, rx) = job_in(DownloadState::Paused);
        {
            let mut info = job.lock();
            info.content_length = 10;
            info.finished_length = 10;
        }
        job.run(&TransferContext::default());
        assert_eq!(
            states(&rx),
            vec![
                (DownloadState::Running, Persist::None),
                (DownloadState::Finished, Persist::Update)
            ]
        );
        assert!(job.snapshot().finish_time.is_some());
    }

    #[test]
    fn unreachable_host_fails() {
        let (job, rx) = job_in(DownloadState::Prepared);
        job.run(&TransferContext::default());
        let seen = states(&rx);
        assert_eq!(seen.first(), Some(&(DownloadState::Running, Persist::None)));
        assert_eq!(seen.last(), Some(&(DownloadState::Failed, Persist::Update)));
    }
}
