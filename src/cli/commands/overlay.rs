use crate::domain::models::Stream;
use crate::services::overlay_broker::OverlayBroker;
use clap::Args;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct OverlayArgs {
    pub task_id: String,
    /// Replay from this sequence number instead of tailing live.
    #[arg(long)]
    pub from_seq: Option<u64>,
}

/// Streams raw ANSI-transparent bytes to stdout; chunk boundaries carry no
/// semantic meaning and the payload is never reinterpreted.
pub async fn run(overlay: &Arc<OverlayBroker>, args: OverlayArgs) -> anyhow::Result<()> {
    let mut sub = overlay.subscribe(&args.task_id, args.from_seq.or(Some(0))).await;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    for event in sub.backlog {
        write_event(&mut handle, &event)?;
    }
    while let Ok(event) = sub.live.recv().await {
        write_event(&mut handle, &event)?;
    }
    Ok(())
}

fn write_event(out: &mut impl Write, event: &crate::domain::models::OverlayEvent) -> anyhow::Result<()> {
    match event.stream {
        Stream::Stdout | Stream::Stderr => {
            out.write_all(&event.payload)?;
            out.flush()?;
        }
        Stream::Meta => {
            if let Ok(record) = serde_json::from_slice::<crate::domain::models::MetaRecord>(&event.payload) {
                eprintln!("[meta] {record:?}");
            }
        }
    }
    Ok(())
}
