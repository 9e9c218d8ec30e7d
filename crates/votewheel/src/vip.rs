//! VIP lookups over the server's downloadable VIP document.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use crcon::CrconApi;
use tracing::{debug, error};

use crate::cache::{cached, CacheHost, CacheKey, TtlCache};
use crate::models::VipInfo;
use crate::Result;

const VIP_LIST_TTL: Duration = Duration::from_secs(60);

pub struct VipManager<C: CrconApi> {
    api: Arc<C>,
    cache: TtlCache,
}

impl<C: CrconApi> CacheHost for VipManager<C> {
    fn get_cache(&mut self, _cache_hint: Option<&str>) -> &mut TtlCache {
        &mut self.cache
    }
}

impl<C: CrconApi> VipManager<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self {
            api,
            cache: TtlCache::new(),
        }
    }

    pub async fn get_vip_by_name_or_id(&mut self, player_id_or_name: &str) -> Result<Option<VipInfo>> {
        let vip_list = self.vip_list().await?;
        Ok(vip_list
            .into_iter()
            .find(|vip| player_id_or_name == vip.player_id || player_id_or_name == vip.player_name))
    }

    async fn vip_list(&mut self) -> Result<Vec<VipInfo>> {
        cached(
            &mut self.cache,
            CacheKey::new("get_vip_list"),
            VIP_LIST_TTL,
            fetch_vip_list(self.api.as_ref()),
        )
        .await
    }
}

async fn fetch_vip_list<C: CrconApi>(api: &C) -> Result<Vec<VipInfo>> {
    debug!("downloading VIP list");
    let document = api.download_vips().await?;
    Ok(parse_vip_document(&document))
}

fn parse_vip_document(document: &str) -> Vec<VipInfo> {
    let mut vips = Vec::new();
    for line in document.lines().filter(|l| !l.trim().is_empty()) {
        match parse_vip_line(line) {
            Ok(vip) => vips.push(vip),
            Err(message) => error!(line, message, "error parsing VIP info"),
        }
    }
    vips
}

/// The VIP file puts the name in the middle and names can contain spaces,
/// so the id and expiry are carved off the two ends:
/// `76561198215199999 Some Random Player 3000-01-01T00:00:00+00:00`
fn parse_vip_line(line: &str) -> std::result::Result<VipInfo, &'static str> {
    let start = line.find(' ').ok_or("missing player name")?;
    let end = line.rfind(' ').ok_or("missing expiry")?;
    if start == end {
        return Err("expected id, name and expiry");
    }

    let player_id = &line[..start];
    let player_name = &line[start + 1..end];
    let expiry_text = &line[end + 1..];

    let expiry = DateTime::parse_from_rfc3339(expiry_text)
        .map_err(|_| "invalid expiry timestamp")?
        .with_timezone(&Utc);

    // expiries parked in the year 2999+ mean "never expires"
    let never_expires = NaiveDate::from_ymd_opt(2999, 12, 30)
        .map(|cutoff| expiry.date_naive() >= cutoff)
        .unwrap_or(false);

    Ok(VipInfo {
        player_id: player_id.to_string(),
        player_name: player_name.to_string(),
        vip_expiry: if never_expires { None } else { Some(expiry) },
    })
}
