use super::{BBoxPx, OcrWord};

const WORD_LEVEL: i32 = 5;

/// Word rows (level 5) of tesseract TSV output. Rows without text or with a
/// negative confidence are skipped; filtering by threshold is left to callers.
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();
    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        words.push(OcrWord {
            text: text.to_string(),
            bbox: BBoxPx {
                x: left,
                y: top,
                w: width,
                h: height,
            },
            conf,
        });
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn keeps_word_rows_only() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t400\t200\t-1\t\n\
             4\t1\t1\t1\t1\t0\t40\t50\t130\t40\t-1\t\n\
             5\t1\t1\t1\t1\t1\t40\t50\t130\t40\t91.5\tSALE\n\
             5\t1\t1\t1\t1\t2\t180\t52\t10\t30\t12\t|\n\
             5\t1\t1\t1\t1\t3\t200\t52\t10\t30\t-1\t \n"
        );
        let words = parse_tsv_words(&tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "SALE");
        assert_eq!(
            words[0].bbox,
            BBoxPx {
                x: 40,
                y: 50,
                w: 130,
                h: 40
            }
        );
        assert_eq!(words[0].bbox.center(), (105, 70));
        assert_eq!(words[1].conf, 12.0);
    }

    #[test]
    fn short_rows_are_ignored() {
        assert!(parse_tsv_words(&format!("{HEADER}\n5\t1\t1")).is_empty());
    }
}
