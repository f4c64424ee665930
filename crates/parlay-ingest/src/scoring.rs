//! Fantasy points for a single player-map record

use crate::models::PlayerMapRecord;

/// Points earned by one player on one map.
pub fn calc_score(record: &PlayerMapRecord) -> i32 {
    kill_points(record.kills)
        + multikill_points(record)
        + map_points(record)
        + series_points(record.series_score.as_deref())
        + rating_points(record.r2_0)
        + rank_points(record.overall_rank)
}

fn kill_points(kills: u32) -> i32 {
    match kills {
        0 => -3,
        1..=4 => -1,
        5..=9 => 0,
        k => (k / 5) as i32 - 1,
    }
}

fn multikill_points(record: &PlayerMapRecord) -> i32 {
    record.four_k as i32 + 3 * record.five_k as i32
}

fn map_points(record: &PlayerMapRecord) -> i32 {
    let won = i32::from(record.won_map.unwrap_or(false));

    let differential = match record.map_differential.unwrap_or(0) {
        13 => 5,
        -13 => -5,
        d if d >= 10 => 2,
        5..=9 => 1,
        d if d <= -10 => -1,
        _ => 0,
    };

    won + differential
}

fn series_points(series: Option<&str>) -> i32 {
    match series {
        Some("2-0") => 2,
        Some("3-0") => 4,
        Some("3-1") => 1,
        _ => 0,
    }
}

fn rating_points(rating: Option<f64>) -> i32 {
    match rating.unwrap_or(0.0) {
        r if r >= 2.0 => 3,
        r if r >= 1.75 => 2,
        r if r >= 1.5 => 1,
        _ => 0,
    }
}

fn rank_points(rank: Option<u32>) -> i32 {
    match rank {
        Some(1) => 3,
        Some(2) => 2,
        Some(3) => 1,
        _ => 0,
    }
}
