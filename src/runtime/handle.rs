use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::{
    core::{
        edit::FieldEdit,
        tracker::{RenderedAction, TrackError, Tracked, TrackedSnapshot},
    },
    op::{JournalEntry, JournalRecord},
    persist::{JournalSink, PersistError},
    reflect::Member,
    types::{ActionIndex, JournalSeq},
};

use super::events::TrackedEvent;

/// Errors returned through a [`TrackedHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The editor rejected the command.
    #[error(transparent)]
    Track(#[from] TrackError),
    /// The journal sink failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime task has stopped.
    #[error("runtime channel closed")]
    ChannelClosed,
}

/// Batching and checkpoint settings for [`spawn_tracked`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Flush the sink as soon as a commit record is queued.
    pub flush_on_commit: bool,
    /// Records buffered before a forced append.
    pub batch_max_records: usize,
    /// Longest time a buffered record waits before being appended.
    pub batch_max_latency_ms: u64,
    /// Capacity of the persistence queue.
    pub persist_queue_bound: usize,
    /// Journal records between automatic snapshots; `0` disables them.
    pub snapshot_every_records: usize,
    /// Delete journal records covered by each new snapshot.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_commit: true,
            batch_max_records: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_records: 2000,
            compact_after_snapshot: false,
        }
    }
}

type EditFn<T, U> = Box<dyn for<'a> FnOnce(&mut FieldEdit<'a, T, U>) -> Result<(), TrackError> + Send>;
type InspectFn<T, U> = Box<dyn FnOnce(&Tracked<T, U>) + Send>;

/// Cloneable handle to a running editor task.
pub struct TrackedHandle<T, U = ()> {
    cmd_tx: mpsc::Sender<Command<T, U>>,
    events_tx: broadcast::Sender<TrackedEvent>,
}

impl<T, U> Clone for TrackedHandle<T, U> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command<T, U> {
    Edit {
        user_data: Option<U>,
        edit: EditFn<T, U>,
        resp: oneshot::Sender<Result<Option<ActionIndex>, RuntimeError>>,
    },
    Undo {
        resp: oneshot::Sender<Result<Option<ActionIndex>, RuntimeError>>,
    },
    Redo {
        resp: oneshot::Sender<Result<Option<ActionIndex>, RuntimeError>>,
    },
    Inspect {
        inspect: InspectFn<T, U>,
    },
    Trim {
        keep_from: ActionIndex,
        resp: oneshot::Sender<Result<ActionIndex, RuntimeError>>,
    },
    TrimToSize {
        budget: usize,
        resp: oneshot::Sender<Result<ActionIndex, RuntimeError>>,
    },
    Flush {
        resp: oneshot::Sender<Result<JournalSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg<U> {
    Record(JournalRecord<U>),
    Flush {
        resp: oneshot::Sender<Result<JournalSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: TrackedSnapshot<U>,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Moves `tracked` into a single-writer task and returns a handle to it.
///
/// Journal records drained after every command go to `sink` through a
/// batching persistence worker. Without a sink, records are dropped and
/// every command reports itself durable immediately.
pub fn spawn_tracked<T, U>(
    tracked: Tracked<T, U>,
    sink: Option<Box<dyn JournalSink<U>>>,
    config: RuntimeConfig,
) -> TrackedHandle<T, U>
where
    T: Member + Send + 'static,
    U: Clone + Send + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command<T, U>>(256);
    let (events_tx, _) = broadcast::channel::<TrackedEvent>(1024);

    if sink.is_some() && !tracked.config().journal {
        warn!("journal sink attached to an editor with journaling disabled");
    }

    let (persist_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg<U>>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<JournalSeq, PersistError>>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut tracked = tracked;
        let mut records_since_snapshot = 0usize;

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut tracked,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            &mut records_since_snapshot,
                        ).await;

                        if done {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        if let Some(Ok(seq)) = durable {
                            let _ = events_tx_loop.send(TrackedEvent::DurableUpTo { seq });
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut tracked,
                    &events_tx_loop,
                    persist_tx_opt.as_ref(),
                    &config,
                    &mut records_since_snapshot,
                ).await;
                if done {
                    break;
                }
            }
        }
        debug!("tracked runtime stopped");
    });

    TrackedHandle {
        cmd_tx,
        events_tx,
    }
}

impl<T, U> TrackedHandle<T, U>
where
    T: Member + Send + 'static,
    U: Clone + Send + 'static,
{
    /// Subscribes to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackedEvent> {
        self.events_tx.subscribe()
    }

    /// Runs `edit` as one action annotated with `user_data`. Mutations made
    /// before an error stay recorded.
    pub async fn edit<F>(&self, user_data: Option<U>, edit: F) -> Result<Option<ActionIndex>, RuntimeError>
    where
        F: for<'a> FnOnce(&mut FieldEdit<'a, T, U>) -> Result<(), TrackError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Edit {
                user_data,
                edit: Box::new(edit),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Undoes the latest live action.
    pub async fn undo(&self) -> Result<Option<ActionIndex>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Undo { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Redoes the earliest undone action.
    pub async fn redo(&self) -> Result<Option<ActionIndex>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Redo { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Runs `read` against the editor and returns its result.
    pub async fn read<R, F>(&self, read: F) -> Result<R, RuntimeError>
    where
        R: Send + 'static,
        F: FnOnce(&Tracked<T, U>) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let inspect: InspectFn<T, U> = Box::new(move |tracked| {
            let _ = tx.send(read(tracked));
        });
        self.cmd_tx
            .send(Command::Inspect { inspect })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Renders the whole action list.
    pub async fn history(&self) -> Result<Vec<RenderedAction<U>>, RuntimeError> {
        self.read(|tracked| tracked.render_change_history())
            .await?
            .map_err(RuntimeError::from)
    }

    /// Drops history before `keep_from`, snapping to a valid trim point.
    pub async fn trim_history(&self, keep_from: ActionIndex) -> Result<ActionIndex, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Trim { keep_from, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Trims history down to `budget` encoded bytes.
    pub async fn trim_history_to_size(&self, budget: usize) -> Result<ActionIndex, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::TrimToSize { budget, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Waits until every queued record is appended and flushed.
    pub async fn flush(&self) -> Result<JournalSeq, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes a snapshot of the current editor state to the sink.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Flushes pending records and stops the runtime task.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command<T, U>(
    cmd: Command<T, U>,
    tracked: &mut Tracked<T, U>,
    events_tx: &broadcast::Sender<TrackedEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg<U>>>,
    config: &RuntimeConfig,
    records_since_snapshot: &mut usize,
) -> bool
where
    T: Member + Send + 'static,
    U: Clone + Send + 'static,
{
    match cmd {
        Command::Edit {
            user_data,
            edit,
            resp,
        } => {
            let (outcome, action) = {
                let mut view = match user_data {
                    Some(user_data) => tracked.create_action_with(user_data),
                    None => tracked.create_action(),
                };
                let outcome = edit(&mut *view);
                (outcome, view.commit())
            };
            let res = forward_journal(tracked, events_tx, persist_tx, records_since_snapshot)
                .and_then(|()| outcome.map_err(RuntimeError::from))
                .map(|()| {
                    if let Some(action) = action {
                        let _ = events_tx.send(TrackedEvent::ActionCommitted { action });
                    }
                    action
                });
            let snapshot = auto_checkpoint_snapshot(tracked, persist_tx.is_some(), config, *records_since_snapshot);
            maybe_auto_checkpoint(snapshot, persist_tx, config, records_since_snapshot).await;
            let _ = resp.send(res);
        }
        Command::Undo { resp } => {
            let res = tracked
                .undo_action()
                .map_err(RuntimeError::from)
                .and_then(|action| {
                    forward_journal(tracked, events_tx, persist_tx, records_since_snapshot)?;
                    if let Some(action) = action {
                        let _ = events_tx.send(TrackedEvent::UndoApplied { action });
                    }
                    Ok(action)
                });
            let _ = resp.send(res);
        }
        Command::Redo { resp } => {
            let res = tracked
                .redo_action()
                .map_err(RuntimeError::from)
                .and_then(|action| {
                    forward_journal(tracked, events_tx, persist_tx, records_since_snapshot)?;
                    if let Some(action) = action {
                        let _ = events_tx.send(TrackedEvent::RedoApplied { action });
                    }
                    Ok(action)
                });
            let _ = resp.send(res);
        }
        Command::Inspect { inspect } => {
            inspect(tracked);
        }
        Command::Trim { keep_from, resp } => {
            let trim_point = tracked.trim_history(keep_from);
            let res = forward_journal(tracked, events_tx, persist_tx, records_since_snapshot).map(|()| {
                let _ = events_tx.send(TrackedEvent::HistoryTrimmed { trim_point });
                trim_point
            });
            let _ = resp.send(res);
        }
        Command::TrimToSize { budget, resp } => {
            let trim_point = tracked.trim_history_to_size(budget);
            let res = forward_journal(tracked, events_tx, persist_tx, records_since_snapshot).map(|()| {
                let _ = events_tx.send(TrackedEvent::HistoryTrimmed { trim_point });
                trim_point
            });
            let _ = resp.send(res);
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx
                    .send(PersistMsg::Flush { resp: flush_tx })
                    .await
                    .is_err()
                {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(tracked.latest_journal_seq())
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = persist_tx {
                let snapshot = tracked.export_snapshot();
                match snapshot {
                    Ok(snapshot) => send_checkpoint(tx, snapshot, config.compact_after_snapshot).await,
                    Err(err) => Err(RuntimeError::from(err)),
                }
            } else {
                Ok(())
            };
            if out.is_ok() {
                *records_since_snapshot = 0;
            }
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                let send_res = tx.send(PersistMsg::Shutdown { resp: done_tx }).await;
                if send_res.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    match done_rx.await {
                        Ok(()) => Ok(()),
                        Err(_) => Err(RuntimeError::ChannelClosed),
                    }
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

/// Drains queued journal records into the persistence queue.
fn forward_journal<T, U>(
    tracked: &mut Tracked<T, U>,
    events_tx: &broadcast::Sender<TrackedEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg<U>>>,
    records_since_snapshot: &mut usize,
) -> Result<(), RuntimeError>
where
    T: Member,
    U: Clone,
{
    let records = tracked.drain_journal();
    let Some(tx) = persist_tx else {
        let _ = events_tx.send(TrackedEvent::DurableUpTo {
            seq: tracked.latest_journal_seq(),
        });
        return Ok(());
    };
    for record in records {
        *records_since_snapshot += 1;
        enqueue_persist(tx, record)?;
    }
    Ok(())
}

fn spawn_persistence_worker<U>(
    sink: Box<dyn JournalSink<U>>,
    mut rx: mpsc::Receiver<PersistMsg<U>>,
    durable_tx: mpsc::UnboundedSender<Result<JournalSeq, PersistError>>,
    config: RuntimeConfig,
) where
    U: Send + 'static,
{
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        let mut buf = Vec::<JournalRecord<U>>::new();
        let mut deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let mut last_durable: JournalSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Record(record) => {
                            let is_commit = matches!(record.entry, JournalEntry::ActionCommitted { .. });
                            buf.push(record);

                            if buf.len() >= config.batch_max_records || (config.flush_on_commit && is_commit) {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                                deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Checkpoint { snapshot, compact, resp } => {
                            let flush_result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let result = if let Err(err) = flush_result {
                                Err(err)
                            } else {
                                let sink_ref = Arc::clone(&sink);
                                match tokio::task::spawn_blocking(move || {
                                    let mut sink = sink_ref.blocking_lock();
                                    sink.write_snapshot(&snapshot)?;
                                    if compact {
                                        let _ = sink.compact_through(snapshot.last_seq)?;
                                    }
                                    Result::<(), PersistError>::Ok(())
                                }).await {
                                    Ok(inner) => inner,
                                    Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                                }
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, false).await;
                    deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                }
            }
        }
    });
}

async fn flush_buf<U>(
    sink: &Arc<Mutex<Box<dyn JournalSink<U>>>>,
    buf: &mut Vec<JournalRecord<U>>,
    last_durable: &mut JournalSeq,
    durable_tx: &mpsc::UnboundedSender<Result<JournalSeq, PersistError>>,
    call_flush: bool,
) -> Result<(), PersistError>
where
    U: Send + 'static,
{
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.flush()
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let records = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let append_res: Result<JournalSeq, PersistError> = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let seq = sink.append_records(&records)?;
        if call_flush {
            sink.flush()?;
        }
        Ok(seq)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    match append_res {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            let _ = durable_tx.send(Ok(*last_durable));
            Ok(())
        }
        Err(err) => {
            warn!(%err, "journal append failed");
            let _ = durable_tx.send(Err(PersistError::Message(format!("append failed: {err}"))));
            Err(err)
        }
    }
}

async fn send_checkpoint<U>(
    tx: &mpsc::Sender<PersistMsg<U>>,
    snapshot: TrackedSnapshot<U>,
    compact: bool,
) -> Result<(), RuntimeError> {
    let (cp_tx, cp_rx) = oneshot::channel();
    if tx
        .send(PersistMsg::Checkpoint {
            snapshot,
            compact,
            resp: cp_tx,
        })
        .await
        .is_err()
    {
        return Err(RuntimeError::ChannelClosed);
    }
    cp_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)
        .and_then(|r| r.map_err(RuntimeError::from))
}

/// Snapshot for an automatic checkpoint, when one is due. Taken before any
/// await so the editor is never borrowed across a suspension point.
fn auto_checkpoint_snapshot<T, U>(
    tracked: &Tracked<T, U>,
    has_sink: bool,
    config: &RuntimeConfig,
    records_since_snapshot: usize,
) -> Option<TrackedSnapshot<U>>
where
    T: Member,
    U: Clone,
{
    if !has_sink || config.snapshot_every_records == 0 || records_since_snapshot < config.snapshot_every_records {
        return None;
    }
    match tracked.export_snapshot() {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(%err, "automatic checkpoint skipped");
            None
        }
    }
}

async fn maybe_auto_checkpoint<U>(
    snapshot: Option<TrackedSnapshot<U>>,
    persist_tx: Option<&mpsc::Sender<PersistMsg<U>>>,
    config: &RuntimeConfig,
    records_since_snapshot: &mut usize,
) {
    let (Some(snapshot), Some(tx)) = (snapshot, persist_tx) else {
        return;
    };
    if send_checkpoint(tx, snapshot, config.compact_after_snapshot).await.is_ok() {
        *records_since_snapshot = 0;
    }
}

fn enqueue_persist<U>(tx: &mpsc::Sender<PersistMsg<U>>, record: JournalRecord<U>) -> Result<(), RuntimeError> {
    tx.try_send(PersistMsg::Record(record)).map_err(|err| {
        RuntimeError::Persist(PersistError::Message(format!("persist queue error: {err}")))
    })
}
