//! Statistik network-wide, dihitung ulang per agregasi (tidak disimpan).

use serde::{Deserialize, Serialize};

use crate::peer::{PeerRecord, PeerStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
    /// Rata-rata `response_time` record online (dibulatkan), 0 jika tidak ada.
    pub avg_response_time: u64,
    /// Hanya atas record dengan `block_height > 0`; 0 jika tidak ada.
    pub max_block_height: u64,
    pub min_block_height: u64,
}

impl NetworkStats {
    pub fn compute(records: &[PeerRecord]) -> Self {
        let mut stats = NetworkStats {
            total: records.len(),
            ..Default::default()
        };

        let mut online_time_sum: u64 = 0;
        for r in records {
            match r.status {
                PeerStatus::Online => {
                    stats.online += 1;
                    online_time_sum = online_time_sum.saturating_add(r.response_time);
                }
                PeerStatus::Offline => stats.offline += 1,
                PeerStatus::Error => stats.error += 1,
            }
        }

        if stats.online > 0 {
            let n = stats.online as u64;
            stats.avg_response_time = (online_time_sum + n / 2) / n;
        }

        let heights = records.iter().map(|r| r.block_height).filter(|h| *h > 0);
        stats.max_block_height = heights.clone().max().unwrap_or(0);
        stats.min_block_height = heights.min().unwrap_or(0);

        stats
    }
}
