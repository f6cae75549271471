use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::tracker::{LoadTicket, Session, Snapshot, Tracker};

/// Loads the latest term, then one selection per input line. A new selection
/// aborts the load in flight and snapshots from older generations never reach
/// `render`. When input ends the last load is awaited before returning.
pub async fn watch<R, F>(
    tracker: &Tracker,
    input: R,
    mut session: Session,
    mut render: F,
) -> std::io::Result<Session>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&Snapshot),
{
    let (tx, mut rx) = mpsc::channel::<Snapshot>(8);
    let spawn_load = |ticket: LoadTicket| -> JoinHandle<()> {
        let tracker = tracker.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let snapshot = tracker.load(ticket).await;
            let _ = tx.send(snapshot).await;
        })
    };

    let mut in_flight = session.select_latest().map(&spawn_load);
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let code = line.trim();
                if code.is_empty() {
                    continue;
                }
                match session.select(code) {
                    Some(ticket) => {
                        if let Some(handle) = in_flight.take() {
                            handle.abort();
                        }
                        info!(term = code, generation = ticket.generation, "term selected");
                        in_flight = Some(spawn_load(ticket));
                    }
                    None => warn!(term = code, "term is not available for this student"),
                }
            }
            Some(snapshot) = rx.recv() => accept(&mut session, snapshot, &mut render),
        }
    }

    if let Some(handle) = in_flight {
        let _ = handle.await;
    }
    while let Ok(snapshot) = rx.try_recv() {
        accept(&mut session, snapshot, &mut render);
    }
    Ok(session)
}

fn accept<F: FnMut(&Snapshot)>(session: &mut Session, snapshot: Snapshot, render: &mut F) {
    if session.accept(snapshot) {
        if let Some(latest) = session.latest() {
            render(latest);
        }
    }
}
