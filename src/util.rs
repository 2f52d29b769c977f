const CONFIG_FILE: &str = "FLEETWATCH_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "./fleetwatch.json";

pub fn get_config_path() -> String {
    std::env::var(CONFIG_FILE).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
}

const DIRECTORY_URL: &str = "FLEETWATCH_DIRECTORY_URL";

pub fn get_directory_url() -> Option<String> {
    std::env::var(DIRECTORY_URL).ok()
}

const DATABASE_PATH: &str = "FLEETWATCH_DB_PATH";

pub fn get_database_path() -> Option<String> {
    std::env::var(DATABASE_PATH).ok()
}
