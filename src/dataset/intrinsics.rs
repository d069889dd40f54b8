use crate::error::{CurationError, Result};
use serde::Serialize;
use std::fmt;

/// Row-major 3x3 pinhole camera matrix as stored in `cam_K.txt`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraIntrinsics {
    pub matrix: [[f64; 3]; 3],
}

impl CameraIntrinsics {
    /// Parse three rows of three numbers; each row may carry a leading
    /// 1-based row number.
    pub fn parse(text: &str) -> Result<Self> {
        let rows: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if rows.len() != 3 {
            return Err(CurationError::Intrinsics {
                details: format!("expected 3 rows, found {}", rows.len()),
            });
        }

        let mut matrix = [[0f64; 3]; 3];
        for (row, line) in rows.iter().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let values = match tokens.len() {
                3 => &tokens[..],
                4 => {
                    let number: usize = tokens[0].parse().map_err(|_| CurationError::Intrinsics {
                        details: format!("row {}: invalid row number '{}'", row + 1, tokens[0]),
                    })?;
                    if number != row + 1 {
                        return Err(CurationError::Intrinsics {
                            details: format!("row {} is numbered {}", row + 1, number),
                        });
                    }
                    &tokens[1..]
                }
                n => {
                    return Err(CurationError::Intrinsics {
                        details: format!("row {}: expected 3 values, found {}", row + 1, n),
                    })
                }
            };

            for (col, value) in values.iter().enumerate() {
                matrix[row][col] = value.parse().map_err(|_| CurationError::Intrinsics {
                    details: format!("row {}: invalid number '{}'", row + 1, value),
                })?;
            }
        }

        Ok(Self { matrix })
    }

    pub fn focal_length(&self) -> (f64, f64) {
        (self.matrix[0][0], self.matrix[1][1])
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.matrix[0][2], self.matrix[1][2])
    }
}

impl fmt::Display for CameraIntrinsics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.matrix {
            writeln!(f, "{} {} {}", row[0], row[1], row[2])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_rows() {
        let k = CameraIntrinsics::parse("615.2 0 320.5\n0 615.9 240.1\n0 0 1\n").unwrap();
        assert_eq!(k.focal_length(), (615.2, 615.9));
        assert_eq!(k.principal_point(), (320.5, 240.1));
    }

    #[test]
    fn test_parse_numbered_rows() {
        let k = CameraIntrinsics::parse("1 600 0 320\n2 0 600 240\n3 0 0 1").unwrap();
        assert_eq!(k.matrix[2], [0.0, 0.0, 1.0]);
        assert_eq!(CameraIntrinsics::parse(&k.to_string()).unwrap(), k);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(CameraIntrinsics::parse("600 0 320\n0 600 240").is_err());
        assert!(CameraIntrinsics::parse("600 0\n0 600 240\n0 0 1").is_err());
        assert!(CameraIntrinsics::parse("600 0 x\n0 600 240\n0 0 1").is_err());
        assert!(CameraIntrinsics::parse("2 600 0 320\n1 0 600 240\n3 0 0 1").is_err());
    }
}
