//! # extract-chars
//!
//! Usage:
//!   extract-chars
//!   GLYPHTRIM_CONFIG=glyphtrim.json extract-chars
//!
//! Reads `table_frame.json`, collects the characters under the `cn` and `jp`
//! keys and writes them to `table_used_characters.txt`.

use glyphtrim::extract::process_file_in;
use glyphtrim::Config;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    };

    let keys = match config.extract.target_keys() {
        Ok(keys) => keys,
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    };

    let extract = &config.extract;
    if !process_file_in(config.language, &extract.input, &extract.output, &keys) {
        std::process::exit(1);
    }
}
