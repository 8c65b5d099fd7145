use crate::{DocumentEncoder, Error, ExportOptions, Exporter, Rasterizer, RegionSection, Result, SectionReport};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    ExportRegion(String, ExportOptions, oneshot::Sender<Result<()>>),
    ExportSections(Vec<RegionSection>, ExportOptions, oneshot::Sender<Result<SectionReport>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly export facade backed by a dedicated worker thread.
///
/// The worker thread owns the rasterizer (which need not be `Send`, since it
/// is constructed on the worker) and runs one export at a time, so captures
/// never overlap even when several async callers share the service.
#[derive(Clone)]
pub struct ExportService {
    cmd_tx: Sender<Command>,
}

impl ExportService {
    /// Spawn the worker and build the rasterizer on it with `make_rasterizer`.
    ///
    /// Documents are produced by encoder type `E`.
    pub async fn spawn<R, E, F>(make_rasterizer: F) -> Result<Self>
    where
        R: Rasterizer + 'static,
        E: DocumentEncoder + 'static,
        F: FnOnce() -> Result<R> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::Builder::new()
            .name("rfexport-worker".into())
            .spawn(move || {
                let rasterizer = match make_rasterizer() {
                    Ok(r) => r,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };
                let mut exporter: Exporter<R, E> = Exporter::with_encoder(rasterizer);
                let _ = init_tx.send(Ok(()));

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::ExportRegion(region_id, options, resp) => {
                            let res = exporter.export_region(&region_id, &options);
                            let _ = resp.send(res);
                        }
                        Command::ExportSections(sections, options, resp) => {
                            let res = exporter.export_sections(&sections, &options);
                            let _ = resp.send(res);
                        }
                        Command::Close(resp) => {
                            let _ = resp.send(Ok(()));
                            break;
                        }
                    }
                }
                log::debug!("export worker stopped");
            })?;

        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx })
    }

    /// Export a single region; `None` uses the default options.
    pub async fn export_region(&self, region_id: &str, options: Option<ExportOptions>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ExportRegion(
            region_id.to_string(),
            options.unwrap_or_default(),
            tx,
        ))?;
        rx.await
            .map_err(|e| Error::Other(format!("Export canceled: {}", e)))?
    }

    /// Export several titled regions into one document; `None` uses the default options.
    pub async fn export_sections(
        &self,
        sections: Vec<RegionSection>,
        options: Option<ExportOptions>,
    ) -> Result<SectionReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ExportSections(sections, options.unwrap_or_default(), tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Export canceled: {}", e)))?
    }

    /// Stop the worker after any queued exports finish.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Other("export worker is not running".into()))
    }
}
