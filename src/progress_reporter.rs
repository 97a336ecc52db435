use std::sync::Arc;
use std::time::Duration;

use circular_buffer::CircularBuffer;

use indicatif::{MultiProgress, ProgressBar, ProgressState, ProgressStyle};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::shared_types::ByteCount;

const SPEED_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
const SPEED_WINDOW: usize = 50;

type ProgressPoint = (ByteCount, Instant);

pub(crate) struct ProgressReporter {
    rx_progress: mpsc::UnboundedReceiver<ByteCount>,
    total_size: ByteCount,
    multi_progress: MultiProgress,
}

impl ProgressReporter {
    pub(crate) fn new(
        rx_progress: mpsc::UnboundedReceiver<ByteCount>,
        total_size: ByteCount,
        multi_progress: MultiProgress,
    ) -> Self {
        Self {
            rx_progress,
            total_size,
            multi_progress,
        }
    }

    /// Runs until every progress sender has been dropped.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        spawn_progress_reporter(self.total_size, self.rx_progress, self.multi_progress)
    }
}

fn format_speed(bytes_per_sec: f64) -> String {
    let (unit, speed) = if bytes_per_sec > 1024.0 * 1024.0 {
        ("MB/s", bytes_per_sec / (1024.0 * 1024.0))
    } else {
        ("kB/s", bytes_per_sec / 1024.0)
    };
    format!("{:.1} {}", speed, unit)
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta}) ({msg})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
        write!(w, "{:.1}s", state.eta().as_secs_f64()).ok();
    })
    .progress_chars("#>-")
}

pub(crate) fn spawn_progress_reporter(
    total_size: ByteCount,
    mut rx_progress: mpsc::UnboundedReceiver<ByteCount>,
    multi: MultiProgress,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut progress: ByteCount = 0;
        let progress_q = Arc::new(RwLock::new(
            CircularBuffer::<SPEED_WINDOW, ProgressPoint>::new(),
        ));
        let pb = multi.add(ProgressBar::new(total_size));
        pb.set_style(progress_style());

        // Scan speed over the recent window, refreshed on a timer
        let speed_task = {
            let progress_q = progress_q.clone();
            let pb = pb.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(SPEED_UPDATE_INTERVAL).await;
                    let q = progress_q.read().await;
                    if let (Some((latest_byte, latest_instant)), Some((oldest_byte, oldest_instant))) =
                        (q.back(), q.front())
                    {
                        if latest_byte == oldest_byte {
                            continue;
                        }
                        let speed = (latest_byte - oldest_byte) as f64
                            / latest_instant.duration_since(*oldest_instant).as_secs_f64();
                        pb.set_message(format_speed(speed));
                    }
                }
            })
        };

        while let Some(chunk_size) = rx_progress.recv().await {
            progress += chunk_size;
            pb.set_position(progress);
            progress_q.write().await.push_back((progress, Instant::now()));
        }
        speed_task.abort();

        let speed = progress as f64 / pb.elapsed().as_secs_f64().max(f64::EPSILON);
        pb.finish_with_message(format_speed(speed));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn speed_units() {
        assert_eq!(format_speed(512.0), "0.5 kB/s");
        assert_eq!(format_speed(3.0 * 1024.0 * 1024.0), "3.0 MB/s");
    }

    #[tokio::test]
    async fn reporter_drains_until_senders_drop() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let (s_progress, r_progress) = mpsc::unbounded_channel();
        let handle = ProgressReporter::new(r_progress, 12, multi).spawn();
        for n in [4, 4, 4] {
            s_progress.send(n).unwrap();
        }
        drop(s_progress);
        handle.await.unwrap();
    }
}
