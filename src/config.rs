use std::path::PathBuf;

pub const APP_NAME: &str = "Murmur";

pub const API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct:free";

/// Curated free models surfaced by the front-end.
pub const FREE_MODELS: &[(&str, &str)] = &[
    ("Mistral 7B", "mistralai/mistral-7b-instruct:free"),
    ("Llama 3.2 3B", "meta-llama/llama-3.2-3b-instruct:free"),
    ("Gemini 2.0 Flash", "google/gemini-2.0-flash-exp:free"),
    ("Llama 3.1 8B", "meta-llama/llama-3.1-8b-instruct:free"),
    ("Zephyr 7B", "huggingfaceh4/zephyr-7b-beta:free"),
];

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").expect("HOME not set");
            PathBuf::from(home).join(".local/share")
        })
        .join("murmur")
}

pub fn db_path() -> PathBuf {
    data_dir().join("chats.db")
}

pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}
