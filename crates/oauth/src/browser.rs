use tracing::info;

/// Opens a URL for the operator.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// The platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Headless hosts: print the URL and let the operator open it elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBrowser;

impl BrowserOpener for ManualBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        info!("authorization URL printed for manual opening");
        println!("Open the following URL in a browser and approve access:\n{url}");
        Ok(())
    }
}
