//! # subset-font
//!
//! Usage:
//!   subset-font
//!   GLYPHTRIM_CONFIG=glyphtrim.json subset-font
//!
//! Subsets `QiushuiShotai.ttf` to the characters listed in
//! `table_used_characters.txt` plus '●', and writes
//! `QiushuiShotaiLite.woff2`.

use std::fs;

use glyphtrim::webfont::{needed_characters, FontSubsetter};
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
    let subset = &config.subset;

    let inventory = match fs::read_to_string(&subset.characters) {
        Ok(text) => text,
        Err(e) => {
            println!(
                "{}",
                config.language.character_list_unreadable(&subset.characters, &e)
            );
            std::process::exit(1);
        }
    };
    let needed = needed_characters(&inventory, subset.sentinel);

    let subsetter = FontSubsetter::with_reducer(subset.subsetter())
        .flavor(subset.flavor)
        .language(config.language);
    if subsetter.subset_font(&subset.font, &subset.output, &needed) {
        println!("{}", config.language.optimisation_complete());
    } else {
        std::process::exit(1);
    }
}
