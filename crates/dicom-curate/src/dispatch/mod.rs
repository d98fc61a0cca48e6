//! Worker-pool dispatcher.
//!
//! [`curate_many`] composes the specification, starts a fixed pool of
//! workers and feeds them files as the scanner finds them. Jobs wait in a
//! bounded FIFO queue; a worker gets the next job as soon as it reports
//! back, so no more than `worker_count` files are ever in flight. While the
//! queue is full the scanner waits on its channel. Every finished
//! file produces one progress event, and the run ends with exactly one
//! done event.

mod options;

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::codec::Part10Codec;
use crate::curate::{
    curate_one, CurateOptions, FileDescriptor, FileSource, MapResults, ResultFileInfo,
};
use crate::deid::BasicProfile;
use crate::error::{CurateError, Result};
use crate::lookup::{csv_text_to_rows, extract_column_mappings};
use crate::mapping::MappingOptions;
use crate::scan::{spawn_scan, ScanHandle, ScanMsg, ScanOptions};
use crate::spec::compose_specs;

pub use options::{default_worker_count, InputFile, InputSource, OrganizeOptions, OutputTarget};

use options::InputPlan;

/// Files between progress log lines.
const LOG_EVERY: usize = 100;

/// Scanner messages buffered ahead of the dispatcher.
const SCAN_BUFFER: usize = 256;

/// Queued files beyond which the scanner is left to block on its channel.
const PENDING_LIMIT: usize = 256;

/// Reported to the progress callback.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// One file finished.
    Progress {
        map_results: &'a MapResults,
        processed_files: usize,
        /// Queued, in flight and processed files known so far.
        total_files: usize,
    },
    /// The run is complete; sent exactly once.
    Done(&'a RunSummary),
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Per-file results in completion order, followed by scanner
    /// anomalies. Empty when results were not collected.
    pub map_results: Vec<MapResults>,
    pub processed_files: usize,
    pub total_files: usize,
}

struct Job {
    descriptor: FileDescriptor,
    file_index: usize,
    options: Arc<CurateOptions>,
}

struct Finished {
    worker: usize,
    map_results: MapResults,
}

/// Curate every file `options.input` yields.
///
/// Fails before any work starts on an invalid configuration, and mid-run
/// when the scanner reports a traversal fault or a worker dies. Faults
/// inside a single file never fail the run; they land in that file's
/// results.
pub async fn curate_many<F>(options: OrganizeOptions, mut on_progress: F) -> Result<RunSummary>
where
    F: FnMut(ProgressEvent<'_>),
{
    let spec = Arc::new(compose_specs(&options.spec_layers)?);
    let date_offset = options.validate(&spec)?;

    let column_mappings = match (&options.table, &spec.additional_data) {
        (Some(table), Some(data)) => {
            let rows = csv_text_to_rows(table)?;
            Some(Arc::new(extract_column_mappings(&rows, data.lookups())))
        }
        _ => None,
    };

    let mapping = MappingOptions::new(spec.clone())
        .with_policy(
            options
                .policy
                .clone()
                .unwrap_or_else(|| Arc::new(BasicProfile::for_run())),
        )
        .with_column_mappings(column_mappings)
        .with_date_offset(date_offset)
        .with_skip_modifications(options.skip_modifications)
        .with_skip_validation(options.skip_validation);

    let index = options.file_info_index.clone().map(Arc::new);
    let dynamic_output = options.output.has_dynamic_headers();
    let mut base = CurateOptions::new(mapping)
        .with_hash_method(options.hash_method)
        .with_skip_write(options.skip_write)
        .with_file_info_index(index.as_ref().map(|i| Arc::new(i.post_mapped_only())))
        .with_codec(
            options
                .codec
                .clone()
                .unwrap_or_else(|| Arc::new(Part10Codec::new())),
        );
    if !dynamic_output {
        base = base.with_destination(options.output.destination().await?);
    }

    let mut dispatcher = Dispatcher {
        base: Arc::new(base),
        options: &options,
        pending: VecDeque::new(),
        next_index: 0,
        in_flight: 0,
        processed: 0,
        collected: Vec::new(),
        anomalies: Vec::new(),
    };

    let (mut scan_rx, scan) = match options.input.plan() {
        InputPlan::Scan(source) => {
            let scan_options = ScanOptions::default()
                .with_excluded_filetypes(spec.excluded_filetypes.clone())
                .with_file_info_index(index.clone());
            let (rx, handle) = spawn_scan(source, scan_options, SCAN_BUFFER);
            (Some(rx), Some(handle))
        }
        InputPlan::List(files) => {
            for descriptor in files {
                dispatcher.enqueue(descriptor);
            }
            (None, None)
        }
    };

    info!(workers = options.worker_count, "starting curation run");
    if let Err(e) = dispatcher
        .run(&mut scan_rx, scan.as_ref(), &mut on_progress)
        .await
    {
        error!(error = %e, "curation run failed");
        if let Some(scan) = &scan {
            scan.abort();
        }
        return Err(e);
    }

    let summary = dispatcher.finish();
    info!(
        processed = summary.processed_files,
        total = summary.total_files,
        "curation run complete"
    );
    on_progress(ProgressEvent::Done(&summary));
    Ok(summary)
}

struct Dispatcher<'o> {
    base: Arc<CurateOptions>,
    options: &'o OrganizeOptions,
    pending: VecDeque<FileDescriptor>,
    next_index: usize,
    in_flight: usize,
    processed: usize,
    collected: Vec<MapResults>,
    anomalies: Vec<MapResults>,
}

impl Dispatcher<'_> {
    fn enqueue(&mut self, descriptor: FileDescriptor) {
        self.pending.push_back(descriptor);
    }

    fn total(&self) -> usize {
        self.pending.len() + self.in_flight + self.processed
    }

    fn collecting(&self) -> bool {
        !self.options.skip_collecting_mappings
    }

    /// Build the job for the next file, resolving per-request headers.
    async fn prepare(&mut self, mut descriptor: FileDescriptor) -> std::result::Result<Job, MapResults> {
        let file_index = self.next_index;
        self.next_index += 1;

        if let (Some(headers), FileSource::Http { headers: slot, .. }) =
            (self.options.input.dynamic_headers(), &mut descriptor.source)
        {
            match headers.resolve().await {
                Ok(resolved) => *slot = resolved,
                Err(e) => return Err(fault_result(&descriptor, &e.to_string())),
            }
        }

        let options = if self.options.output.has_dynamic_headers() {
            match self.options.output.destination().await {
                Ok(destination) => Arc::new((*self.base).clone().with_destination(destination)),
                Err(e) => return Err(fault_result(&descriptor, &e.to_string())),
            }
        } else {
            self.base.clone()
        };

        Ok(Job {
            descriptor,
            file_index,
            options,
        })
    }

    fn record<F>(&mut self, map_results: MapResults, on_progress: &mut F)
    where
        F: FnMut(ProgressEvent<'_>),
    {
        self.processed += 1;
        let total = self.total();
        on_progress(ProgressEvent::Progress {
            map_results: &map_results,
            processed_files: self.processed,
            total_files: total,
        });
        if self.processed % LOG_EVERY == 0 {
            info!(processed = self.processed, total, "curation progress");
        }
        if self.collecting() {
            self.collected.push(map_results);
        }
    }

    async fn run<F>(
        &mut self,
        scan_rx: &mut Option<mpsc::Receiver<ScanMsg>>,
        scan: Option<&ScanHandle>,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        let worker_count = self.options.worker_count;
        let (done_tx, mut done_rx) = mpsc::channel::<Finished>(worker_count);
        let mut workers = JoinSet::new();
        let mut job_txs = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let (tx, rx) = mpsc::channel::<Job>(1);
            job_txs.push(tx);
            workers.spawn(worker_loop(id, rx, done_tx.clone()));
        }
        drop(done_tx);

        let mut idle: VecDeque<usize> = (0..worker_count).collect();
        let mut scan_finished = scan_rx.is_none();
        let mut stop_rx = self.options.stop.clone();

        loop {
            while let Some(&worker) = idle.front() {
                let Some(descriptor) = self.pending.pop_front() else {
                    break;
                };
                match self.prepare(descriptor).await {
                    Ok(job) => {
                        idle.pop_front();
                        debug!(worker, file = %job.descriptor.file_path(), "dispatching");
                        if job_txs[worker].send(job).await.is_err() {
                            return Err(CurateError::WorkerCrashed(format!(
                                "worker {} stopped accepting work",
                                worker
                            )));
                        }
                        self.in_flight += 1;
                        debug_assert!(self.in_flight <= worker_count);
                    }
                    Err(failed) => self.record(failed, on_progress),
                }
            }

            if scan_finished && self.pending.is_empty() && self.in_flight == 0 {
                break;
            }

            tokio::select! {
                msg = next_scan(scan_rx), if !scan_finished && self.pending.len() < PENDING_LIMIT => match msg {
                    Some(ScanMsg::File(descriptor)) => self.enqueue(descriptor),
                    Some(ScanMsg::Anomalies { descriptor, anomalies }) => {
                        if !self.options.skip_write && self.collecting() {
                            self.anomalies.push(MapResults::scan_anomaly(
                                &descriptor.name,
                                &descriptor.path,
                                anomalies,
                            ));
                        }
                    }
                    Some(ScanMsg::Done) => scan_finished = true,
                    Some(ScanMsg::Error(message)) => {
                        workers.abort_all();
                        return Err(CurateError::Scan(message));
                    }
                    None => {
                        workers.abort_all();
                        return Err(CurateError::Scan("scanner ended without finishing".to_string()));
                    }
                },
                Some(finished) = done_rx.recv() => {
                    self.in_flight -= 1;
                    idle.push_back(finished.worker);
                    self.record(finished.map_results, on_progress);
                },
                Some(joined) = workers.join_next() => {
                    let reason = match joined {
                        Ok(id) => format!("worker {} exited during the run", id),
                        Err(e) => format!("worker failed: {}", e),
                    };
                    warn!(%reason, "stopping run");
                    workers.abort_all();
                    return Err(CurateError::WorkerCrashed(reason));
                },
                changed = stop_requested(&mut stop_rx) => {
                    if changed {
                        info!("stop requested; finishing dispatched files");
                        if let Some(scan) = scan {
                            scan.stop();
                        }
                    }
                    stop_rx = None;
                },
            }
        }

        drop(job_txs);
        while workers.join_next().await.is_some() {}
        Ok(())
    }

    fn finish(self) -> RunSummary {
        let processed_files = self.processed;
        let mut map_results = self.collected;
        map_results.extend(self.anomalies);
        RunSummary {
            map_results,
            processed_files,
            total_files: processed_files,
        }
    }
}

async fn next_scan(rx: &mut Option<mpsc::Receiver<ScanMsg>>) -> Option<ScanMsg> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolves `true` once stop is requested, `false` if the sender is gone.
async fn stop_requested(rx: &mut Option<watch::Receiver<bool>>) -> bool {
    match rx {
        Some(rx) => rx.wait_for(|stop| *stop).await.is_ok(),
        None => std::future::pending().await,
    }
}

async fn worker_loop(id: usize, mut jobs: mpsc::Receiver<Job>, done: mpsc::Sender<Finished>) -> usize {
    while let Some(job) = jobs.recv().await {
        let outcome = AssertUnwindSafe(curate_one(&job.descriptor, job.file_index, &job.options))
            .catch_unwind()
            .await;
        let map_results = match outcome {
            Ok(results) => results,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(worker = id, file = %job.descriptor.file_path(), %message, "curation panicked");
                fault_result(&job.descriptor, &message)
            }
        };
        if done.send(Finished { worker: id, map_results }).await.is_err() {
            break;
        }
    }
    id
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn fault_result(descriptor: &FileDescriptor, message: &str) -> MapResults {
    let mut results = MapResults::labelled("error", &descriptor.name);
    results
        .errors
        .push(format!("Curation of {} failed: {}", descriptor.name, message));
    results.file_info = Some(ResultFileInfo {
        name: descriptor.name.clone(),
        size: descriptor.size.unwrap_or(0),
        path: descriptor.path.clone(),
        mtime: descriptor.mtime,
        ..ResultFileInfo::default()
    });
    results
}
