use std::path::PathBuf;

/// Environment variable pointing at the directory holding dataset files.
pub const DATA_HOME_ENV: &str = "SCIKIT_LEARN_DATA";

const DEFAULT_DIR_NAME: &str = "scikit_learn_data";

/// Directory datasets are read from: `$SCIKIT_LEARN_DATA`, else `$HOME/scikit_learn_data`.
pub fn data_home() -> PathBuf {
    resolve_data_home(
        std::env::var(DATA_HOME_ENV).ok(),
        std::env::var("HOME").ok(),
    )
}

fn resolve_data_home(data_home: Option<String>, home: Option<String>) -> PathBuf {
    match (data_home, home) {
        (Some(dir), _) if !dir.is_empty() => PathBuf::from(dir),
        (_, Some(home)) if !home.is_empty() => PathBuf::from(home).join(DEFAULT_DIR_NAME),
        _ => PathBuf::from(DEFAULT_DIR_NAME),
    }
}
