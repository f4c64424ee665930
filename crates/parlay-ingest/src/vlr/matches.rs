//! Match page parsers (overview map blocks and the performance tab)

use super::Selectors;
use crate::models::{MapBlock, MapLine, PerformanceLine, PlayerMapRecord};
use scraper::{ElementRef, Html};
use std::collections::HashMap;

fn full_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_line(element: ElementRef<'_>) -> String {
    full_text(element).lines().next().unwrap_or_default().trim().to_string()
}

/// First run of digits in a cell, 0 if there is none
fn leading_number(cell: Option<&ElementRef<'_>>) -> u32 {
    cell.map(|c| full_text(*c))
        .and_then(|text| {
            text.split(|c: char| !c.is_ascii_digit())
                .find(|run| !run.is_empty())
                .and_then(|run| run.parse().ok())
        })
        .unwrap_or(0)
}

/// Multikill counts and overall rating per player name
pub(crate) fn parse_performance(selectors: &Selectors, html: &str) -> HashMap<String, PerformanceLine> {
    let document = Html::parse_document(html);
    let mut lines: HashMap<String, PerformanceLine> = HashMap::new();

    for table in document.select(&selectors.adv_stats_table) {
        for row in table.select(&selectors.row) {
            let Some(team) = row.select(&selectors.team).next() else {
                continue;
            };
            let cells: Vec<ElementRef<'_>> = row.select(&selectors.cell).collect();

            let line = lines.entry(first_line(team)).or_default();
            line.two_k = leading_number(cells.get(2));
            line.three_k = leading_number(cells.get(3));
            line.four_k = leading_number(cells.get(4));
            line.five_k = leading_number(cells.get(5));
        }
    }

    // Rating sits in the first stat cell of the "all maps" scoreboard
    for table in document.select(&selectors.table) {
        for row in table.select(&selectors.row) {
            let Some(name) = row.select(&selectors.text_of).next() else {
                continue;
            };
            let Some(rating) = row
                .select(&selectors.stat_cell)
                .next()
                .and_then(|cell| cell.select(&selectors.rating_both).next())
            else {
                continue;
            };

            let line = lines.entry(full_text(name)).or_default();
            if let Ok(value) = full_text(rating).parse::<f64>() {
                line.r2_0 = Some(value);
            }
        }
    }

    lines
}

/// Played maps of a match, numbered from 1 in page order
pub(crate) fn parse_maps(selectors: &Selectors, html: &str) -> Vec<MapBlock> {
    let document = Html::parse_document(html);

    document
        .select(&selectors.game_block)
        .filter(|block| block.value().attr("data-game-id") != Some("all"))
        .enumerate()
        .map(|(idx, block)| MapBlock {
            map_num: idx as u32 + 1,
            map_name: block
                .select(&selectors.map_name)
                .next()
                .map(first_line)
                .filter(|name| !name.is_empty()),
            players: block
                .select(&selectors.body_row)
                .filter_map(|row| map_line(selectors, row))
                .collect(),
        })
        .collect()
}

fn map_line(selectors: &Selectors, row: ElementRef<'_>) -> Option<MapLine> {
    let name = row.select(&selectors.text_of).next()?;
    let kills = row.select(&selectors.kills).next()?;
    let deaths = row.select(&selectors.deaths).next()?;
    let assists = row.select(&selectors.assists).next()?;

    let count = |cell: ElementRef<'_>| -> u32 {
        cell.select(&selectors.both)
            .next()
            .and_then(|span| full_text(span).parse().ok())
            .unwrap_or(0)
    };

    Some(MapLine {
        name: full_text(name),
        kills: count(kills),
        deaths: count(deaths),
        assists: count(assists),
    })
}

/// Flatten maps into one record per player per map
pub(crate) fn build_rows(
    match_id: &str,
    match_url: &str,
    maps: &[MapBlock],
    performance: &HashMap<String, PerformanceLine>,
) -> Vec<PlayerMapRecord> {
    let mut rows = Vec::new();

    for map in maps {
        for player in &map.players {
            let perf = performance.get(&player.name).copied().unwrap_or_default();
            rows.push(PlayerMapRecord {
                name: player.name.clone(),
                kills: player.kills,
                deaths: player.deaths,
                assists: player.assists,
                two_k: perf.two_k,
                three_k: perf.three_k,
                four_k: perf.four_k,
                five_k: perf.five_k,
                r2_0: perf.r2_0,
                map_name: map.map_name.clone(),
                map_num: map.map_num,
                match_id: match_id.to_string(),
                match_url: match_url.to_string(),
                ..Default::default()
            });
        }
    }

    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const OVERVIEW: &str = r#"
        <div class="vm-stats-game" data-game-id="all">
          <table><tbody>
            <tr>
              <td><div class="text-of">aspas</div></td>
              <td class="mod-vlr-kills"><span class="mod-both">40</span></td>
              <td class="mod-vlr-deaths"><span class="mod-both">30</span></td>
              <td class="mod-vlr-assists"><span class="mod-both">8</span></td>
            </tr>
          </tbody></table>
        </div>
        <div class="vm-stats-game" data-game-id="101">
          <div class="map">
            Ascent
            <span class="picked">PICK</span>
          </div>
          <table><tbody>
            <tr>
              <td><div class="text-of">aspas</div></td>
              <td class="mod-vlr-kills"><span class="mod-both">24</span></td>
              <td class="mod-vlr-deaths"><span class="mod-both">15</span></td>
              <td class="mod-vlr-assists"><span class="mod-both">3</span></td>
            </tr>
            <tr>
              <td><div class="text-of">Less</div></td>
              <td class="mod-vlr-kills"><span class="mod-both">-</span></td>
              <td class="mod-vlr-deaths"><span class="mod-both">12</span></td>
              <td class="mod-vlr-assists"><span class="mod-both">9</span></td>
            </tr>
            <tr><td><div class="text-of">no stats row</div></td></tr>
          </tbody></table>
        </div>
        <div class="vm-stats-game" data-game-id="102">
          <div class="map">Lotus</div>
          <table><tbody>
            <tr>
              <td><div class="text-of">aspas</div></td>
              <td class="mod-vlr-kills"><span class="mod-both">16</span></td>
              <td class="mod-vlr-deaths"><span class="mod-both">15</span></td>
              <td class="mod-vlr-assists"><span class="mod-both">5</span></td>
            </tr>
          </tbody></table>
        </div>"#;

    const PERFORMANCE: &str = r#"
        <table class="wf-table-inset mod-adv-stats">
          <tr><th></th><th></th><th>2K</th><th>3K</th><th>4K</th><th>5K</th></tr>
          <tr>
            <td><div class="team">aspas
              <div class="ge-text-light">MIBR</div></div></td>
            <td>LEV</td>
            <td>9</td><td>4 <span>x</span></td><td>1</td><td></td>
          </tr>
        </table>
        <table class="wf-table-inset mod-overview">
          <tr>
            <td><div class="text-of">aspas</div></td>
            <td class="mod-stat"><span class="side mod-side mod-both">1.62</span></td>
          </tr>
          <tr>
            <td><div class="text-of">Less</div></td>
            <td class="mod-stat"><span class="side mod-side mod-both">n/a</span></td>
          </tr>
        </table>"#;

    #[test]
    fn test_parse_performance() {
        let perf = parse_performance(&Selectors::new().unwrap(), PERFORMANCE);

        let aspas = perf["aspas"];
        assert_eq!((aspas.two_k, aspas.three_k, aspas.four_k, aspas.five_k), (9, 4, 1, 0));
        assert_eq!(aspas.r2_0, Some(1.62));

        // listed but unrated
        assert_eq!(perf["Less"].r2_0, None);
    }

    #[test]
    fn test_parse_maps_skips_all_block() {
        let maps = parse_maps(&Selectors::new().unwrap(), OVERVIEW);

        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].map_num, 1);
        assert_eq!(maps[0].map_name.as_deref(), Some("Ascent"));
        assert_eq!(maps[0].players.len(), 2);
        assert_eq!(maps[0].players[0].kills, 24);
        assert_eq!(maps[0].players[1].kills, 0);
        assert_eq!(maps[1].map_name.as_deref(), Some("Lotus"));
        assert_eq!(maps[1].map_num, 2);
    }

    #[test]
    fn test_build_rows_joins_performance() {
        let selectors = Selectors::new().unwrap();
        let maps = parse_maps(&selectors, OVERVIEW);
        let perf = parse_performance(&selectors, PERFORMANCE);
        let rows = build_rows("542195", "https://www.vlr.gg/542195/x?tab=overview", &maps, &perf);

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.match_id == "542195"));

        let first = &rows[0];
        assert_eq!(first.name, "aspas");
        assert_eq!(first.four_k, 1);
        assert_eq!(first.map_name.as_deref(), Some("Ascent"));

        let less = &rows[1];
        assert_eq!(less.two_k, 0);
        assert_eq!(less.r2_0, None);
    }
}
