use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::store::{expand_path, DEFAULT_CREDENTIALS_PATH};

pub const BASE_URL_ENV: &str = "BOOKCASE_BASE_URL";
pub const CREDENTIALS_ENV: &str = "BOOKCASE_CREDENTIALS";

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const PAGE_SIZES: [u32; 3] = [10, 20, 50];

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub credentials_path: PathBuf,
    pub keep_session_on_unauthorized: bool,
}

impl Config {
    pub fn new(base_url: Option<&str>, credentials: Option<&str>, keep_session_on_unauthorized: bool) -> Result<Config> {
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .with_context(|| format!("No API base URL configured, set {} or pass --base-url", BASE_URL_ENV))?;
        Ok(Config {
            base_url: parse_base_url(base_url)?,
            credentials_path: expand_path(credentials.unwrap_or(DEFAULT_CREDENTIALS_PATH))?,
            keep_session_on_unauthorized,
        })
    }
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Base URL {} is not a valid URL", raw))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        bail!("Base URL {} must be http or https", raw);
    }
    if url.cannot_be_a_base() {
        bail!("Base URL {} can't have paths joined onto it", raw);
    }
    Ok(url)
}

pub fn check_page_size(limit: u32) -> Result<u32> {
    if !PAGE_SIZES.contains(&limit) {
        bail!("Page size must be one of 10, 20 or 50, got {}", limit);
    }
    Ok(limit)
}

pub fn check_page(page: u32) -> Result<u32> {
    if page == 0 {
        bail!("Pages are numbered from 1");
    }
    Ok(page)
}
