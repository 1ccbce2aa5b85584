use std::ffi::OsStr;
use std::fs::File;

use justconfig::item::ValueExtractor;
use justconfig::processors::Trim;
use justconfig::sources::env::Env;
use justconfig::sources::text::ConfigText;
use justconfig::ConfPath;
use justconfig::Config;

use crate::config_processors::Unquote;

// Set some default values
const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 50;
const DEFAULT_BATCH_SIZE: usize = 256;
const DEFAULT_VALID_PORTION: f64 = 0.1;
const DEFAULT_DROPOUT_RATE: f64 = 0.5;
const DEFAULT_EXEMPLAR_BUDGET: usize = 30000;
const DEFAULT_SELECTION_STRATEGY: &str = "herding";
const DEFAULT_RANDOM_SEED: u64 = 42;

pub struct AppConfig {
    pub log: LogConfig,
    pub data: DataConfig,
    pub train: TrainConfig,
    pub exemplar: ExemplarConfig,
}

pub struct LogConfig {
    pub level: String,
}

pub struct DataConfig {
    pub data_dir: String,
}

pub struct TrainConfig {
    pub max_sequence_length: usize,
    pub batch_size: usize,
    pub valid_portion: f64,
    pub dropout_rate: f64,
    pub random_seed: u64,
}

pub struct ExemplarConfig {
    pub exemplar_budget: usize,
    pub selection_strategy: String,
    pub allocate_by_frequency: bool,
}

impl AppConfig {
    pub fn new(config_path: String) -> AppConfig {
        // Initialize config object
        let mut conf = Config::default();

        // Check if there is a config file
        if let Ok(config_file) = File::open(&config_path) {
            let config_text = ConfigText::new(config_file, &config_path)
                .expect("Loading configuration file failed.");
            conf.add_source(config_text);
        }

        // Define config params from environment variables
        let config_env = Env::new(&[
            (
                ConfPath::from(&["data", "data_dir"]),
                OsStr::new("DATA_DIR"),
            ),
            (
                ConfPath::from(&["train", "random_seed"]),
                OsStr::new("RANDOM_SEED"),
            ),
        ]);
        conf.add_source(config_env);

        // Parse into custom config struct
        AppConfig::parse(conf)
    }

    fn parse(conf: justconfig::Config) -> AppConfig {
        AppConfig {
            log: LogConfig::parse(&conf, ConfPath::from(&["log"])),
            data: DataConfig::parse(&conf, ConfPath::from(&["data"])),
            train: TrainConfig::parse(&conf, ConfPath::from(&["train"])),
            exemplar: ExemplarConfig::parse(&conf, ConfPath::from(&["exemplar"])),
        }
    }
}

impl LogConfig {
    fn parse(conf: &Config, path: ConfPath) -> LogConfig {
        LogConfig {
            level: conf
                .get(path.push("level"))
                .unquote()
                .value()
                .unwrap_or_default(),
        }
    }
}

impl DataConfig {
    fn parse(conf: &Config, path: ConfPath) -> DataConfig {
        DataConfig {
            data_dir: conf
                .get(path.push("data_dir"))
                .unquote()
                .value()
                .unwrap(),
        }
    }
}

impl TrainConfig {
    fn parse(conf: &Config, path: ConfPath) -> TrainConfig {
        TrainConfig {
            max_sequence_length: conf
                .get(path.push("max_sequence_length"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_MAX_SEQUENCE_LENGTH),
            batch_size: conf
                .get(path.push("batch_size"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_BATCH_SIZE),
            valid_portion: conf
                .get(path.push("valid_portion"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_VALID_PORTION),
            dropout_rate: conf
                .get(path.push("dropout_rate"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_DROPOUT_RATE),
            random_seed: conf
                .get(path.push("random_seed"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_RANDOM_SEED),
        }
    }
}

impl ExemplarConfig {
    fn parse(conf: &Config, path: ConfPath) -> ExemplarConfig {
        ExemplarConfig {
            exemplar_budget: conf
                .get(path.push("exemplar_budget"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_EXEMPLAR_BUDGET),
            selection_strategy: conf
                .get(path.push("selection_strategy"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_SELECTION_STRATEGY)),
            allocate_by_frequency: conf
                .get(path.push("allocate_by_frequency"))
                .trim()
                .value()
                .unwrap_or(true),
        }
    }
}
