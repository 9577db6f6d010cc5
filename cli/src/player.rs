use anyhow::{anyhow, Context, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum PlayerRequest {
    Play { path: PathBuf, reply: Sender<Result<()>> },
    Stop,
}

/// Plays preview tracks on a dedicated thread, since the output stream must
/// stay on the thread that opened it.
#[derive(Clone)]
pub struct AudioPlayer {
    requests: Sender<PlayerRequest>,
    playing: Arc<AtomicBool>,
}

impl AudioPlayer {
    pub fn spawn() -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let playing = Arc::new(AtomicBool::new(false));
        let flag = playing.clone();

        thread::Builder::new()
            .name("vibesync-audio".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow!("failed to open audio output: {err}")));
                        return;
                    }
                };
                run_audio_loop(&handle, request_rx, &flag);
            })
            .context("failed to spawn audio thread")?;

        ready_rx.recv().context("audio thread exited during startup")??;
        Ok(Self { requests: request_tx, playing })
    }

    pub fn play(&self, path: &Path) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.requests
            .send(PlayerRequest::Play { path: path.to_path_buf(), reply: reply_tx })
            .map_err(|_| anyhow!("audio thread has stopped"))?;
        reply_rx.recv().context("audio thread dropped the play request")?
    }

    pub fn stop(&self) {
        let _ = self.requests.send(PlayerRequest::Stop);
        self.playing.store(false, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

fn run_audio_loop(
    handle: &OutputStreamHandle,
    requests: Receiver<PlayerRequest>,
    playing: &AtomicBool,
) {
    let mut sink: Option<Sink> = None;
    loop {
        match requests.recv_timeout(POLL_INTERVAL) {
            Ok(PlayerRequest::Play { path, reply }) => {
                if let Some(current) = sink.take() {
                    current.stop();
                }
                let result = match start_sink(handle, &path) {
                    Ok(next) => {
                        sink = Some(next);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            Ok(PlayerRequest::Stop) => {
                if let Some(current) = sink.take() {
                    current.stop();
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let active = sink.as_ref().map(|current| !current.empty()).unwrap_or(false);
        playing.store(active, Ordering::SeqCst);
    }
    debug!("audio thread shutting down");
}

fn start_sink(handle: &OutputStreamHandle, path: &Path) -> Result<Sink> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let decoder = Decoder::new(BufReader::new(file)).context("failed to decode audio")?;
    let sink = Sink::try_new(handle).context("failed to create audio sink")?;
    sink.append(decoder);
    sink.play();
    Ok(sink)
}
