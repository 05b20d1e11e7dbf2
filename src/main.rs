use log::{error, info, warn};
use options::{LogFormat, Options};
use std::io::Write;
use std::sync::Arc;
use structopt::StructOpt;
use vigilantpi::constants::EXIT_CODE_REBOOT;
use vigilantpi::domain::config::{self, Config};
use vigilantpi::domain::host;
use vigilantpi::domain::notification::Notifier;
use vigilantpi::harness::{Heart, ModuleRunner};
use vigilantpi::library::indicator::{Indicator, LogSink};
use vigilantpi::library::kvstore::{JsonFileStore, KeyValueStore, MemoryStore};
use vigilantpi::module::context::{Runtime, Settings};
use vigilantpi::module::supervisor::Supervisor;

mod options;

#[tokio::main]
async fn main() {
    let options = Options::from_args();
    init_logging(&options);

    info!("VigilantPI {}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load(&options.config) {
        Ok(config) => config,
        Err(e) => {
            error!("error loading configuration: {}", e);

            match config::try_rollback(&options.config) {
                Ok(()) => {
                    warn!("backup configuration restored, requesting reboot");
                    host::reboot_host().await;
                    std::process::exit(EXIT_CODE_REBOOT);
                }
                Err(rollback) => {
                    error!("unable to restore a backup configuration: {}", rollback);
                    std::process::exit(1);
                }
            }
        }
    };

    let settings = Settings::resolve(&config, options.config.clone(), options.log_file.clone());
    info!("video duration: {:?}", settings.duration);

    let indicator = build_indicator(&config);
    indicator.bad_hd();

    let kv: Arc<dyn KeyValueStore> = match JsonFileStore::open(&options.db).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("can't open key/value store, falling back to memory: {}", e);
            Arc::new(MemoryStore::new())
        }
    };

    let (notifier, notifications) = Notifier::channel(!config.telegram_bot.token.is_empty());
    let (heart, heart_stone) = Heart::new();

    let runtime = Runtime::assemble(config, settings, indicator, notifier, kv, heart_stone);
    let supervisor = Supervisor::new(runtime, heart, notifications);

    let outcome = ModuleRunner::default().run(supervisor).await;

    if outcome.wants_reboot() {
        host::reboot_host().await;
    }

    if !outcome.drained {
        // an external supervisor interprets this as "reboot me"
        std::process::exit(EXIT_CODE_REBOOT);
    }
}

fn init_logging(options: &Options) {
    let log_file = options.log_file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Arc::new(file)),
            Err(e) => {
                eprintln!("can't open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let writer = move || -> Box<dyn Write + Send> {
        match &log_file {
            Some(file) => Box::new(TeeWriter { file: file.clone() }),
            None => Box::new(std::io::stdout()),
        }
    };

    let formatter = tracing_subscriber::fmt()
        .with_env_filter(options.log.as_str())
        .with_writer(writer);

    match options.log_format {
        LogFormat::Text => formatter.init(),
        LogFormat::Compact => formatter.compact().init(),
        LogFormat::Json => formatter.json().init(),
    };
}

/// Copies log output to the admin-visible log file in addition to stdout
struct TeeWriter {
    file: Arc<std::fs::File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.file).write_all(buf).ok();
        std::io::stdout().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.file).flush().ok();
        std::io::stdout().flush()
    }
}

fn build_indicator(config: &Config) -> Indicator {
    #[cfg(feature = "gpio")]
    {
        if config.raspberry_pi.led_pin > 0 {
            match vigilantpi::library::indicator::GpioSink::new(config.raspberry_pi.led_pin) {
                Ok(sink) => return Indicator::spawn(Box::new(sink)),
                Err(e) => error!("error setting up LED: {}", e),
            }
        }
    }

    if config.raspberry_pi.led_pin > 0 && !cfg!(feature = "gpio") {
        warn!("led_pin configured but the gpio feature is not compiled in");
    }

    Indicator::spawn(Box::new(LogSink))
}
