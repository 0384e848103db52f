//! Minimal CSV reading and writing.
//!
//! Quoted fields, escaped quotes, embedded separators and line breaks are
//! supported. Blank lines are skipped. No header handling: every line is a row.

use crate::error::{MicroError, Result};

/// Parse CSV text into rows of fields.
pub fn parse(content: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                if c == '\n' {
                    line += 1;
                }
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                line += 1;
                if row.is_empty() && field.is_empty() && !quoted {
                    continue;
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                quoted = false;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(MicroError::InvalidInput(format!(
            "Unterminated quoted CSV field near line {}",
            line
        )));
    }

    if !row.is_empty() || !field.is_empty() || quoted {
        row.push(field);
        rows.push(row);
    }

    Ok(rows)
}

/// Write rows as CSV text, one line per row.
pub fn write(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let sole_empty = row.len() == 1 && row[0].is_empty();
        let line = row
            .iter()
            .map(|field| escape(field, sole_empty))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn escape(field: &str, force: bool) -> String {
    let needs_quotes =
        force || field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_parse_simple_rows() {
        let rows = parse("Microstructure,Tau\nm1.tif,1.52\r\nm2.tif,2.01\n").unwrap();
        assert_eq!(
            rows,
            vec![
                row(&["Microstructure", "Tau"]),
                row(&["m1.tif", "1.52"]),
                row(&["m2.tif", "2.01"]),
            ]
        );
    }

    #[test]
    fn test_parse_quoted_fields() {
        let rows = parse("name,note\n\"a,b\",\"say \"\"hi\"\"\nnext line\"\n").unwrap();
        assert_eq!(rows[1], row(&["a,b", "say \"hi\"\nnext line"]));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let rows = parse("a,b\n\n1,2\n\n").unwrap();
        assert_eq!(rows, vec![row(&["a", "b"]), row(&["1", "2"])]);
    }

    #[test]
    fn test_unterminated_quote_fails() {
        assert!(parse("a,\"b\n1,2\n").is_err());
    }

    #[test]
    fn test_written_csv_reads_back_identically() {
        let original = "id,comment,value\n1,\"x, y\",3.5\n2,\"multi\nline\",\n3,\"\"\"quoted\"\"\",-1\n";
        let rows = parse(original).unwrap();
        let rewritten = write(&rows);
        assert_eq!(parse(&rewritten).unwrap(), rows);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], row(&["2", "multi\nline", ""]));
    }

    #[test]
    fn test_sole_empty_field_survives() {
        let rows = vec![row(&["a"]), row(&[""]), row(&["b"])];
        assert_eq!(parse(&write(&rows)).unwrap(), rows);
    }
}
