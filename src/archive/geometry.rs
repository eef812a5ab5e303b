//! Geometry struct-strings.
//!
//! Keyed coders archive `CGRect` and friends as the strings produced by
//! `NSStringFromCGRect` et al: `"{{x, y}, {w, h}}"`, `"{x, y}"`,
//! `"{top, left, bottom, right}"`. Parsing is tolerant of whitespace and
//! validates only the number count, which is what the agent itself does.

use crate::error::{LookinError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Insets {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

/// Pull every decimal number out of a struct-string, in order.
fn numbers(s: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    let mut token = String::new();

    for ch in s.chars() {
        if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E') {
            token.push(ch);
        } else if !token.is_empty() {
            out.push(parse_number(&token, s)?);
            token.clear();
        }
    }
    if !token.is_empty() {
        out.push(parse_number(&token, s)?);
    }
    Ok(out)
}

fn parse_number(token: &str, whole: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| LookinError::InvalidFrame(format!("malformed geometry string {whole:?}")))
}

fn expect_count(s: &str, want: usize) -> Result<Vec<f64>> {
    let nums = numbers(s)?;
    if nums.len() != want {
        return Err(LookinError::InvalidFrame(format!(
            "geometry string {s:?} has {} components, expected {want}",
            nums.len()
        )));
    }
    Ok(nums)
}

pub fn parse_point(s: &str) -> Result<Point> {
    let n = expect_count(s, 2)?;
    Ok(Point { x: n[0], y: n[1] })
}

pub fn parse_size(s: &str) -> Result<Size> {
    let n = expect_count(s, 2)?;
    Ok(Size { w: n[0], h: n[1] })
}

pub fn parse_rect(s: &str) -> Result<Rect> {
    let n = expect_count(s, 4)?;
    Ok(Rect {
        x: n[0],
        y: n[1],
        w: n[2],
        h: n[3],
    })
}

pub fn parse_insets(s: &str) -> Result<Insets> {
    let n = expect_count(s, 4)?;
    Ok(Insets {
        top: n[0],
        left: n[1],
        bottom: n[2],
        right: n[3],
    })
}

/// Format a number the way Apple's struct-string printers do: integral
/// values lose the fraction.
fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub fn format_point(p: Point) -> String {
    format!("{{{}, {}}}", fmt_num(p.x), fmt_num(p.y))
}

pub fn format_size(s: Size) -> String {
    format!("{{{}, {}}}", fmt_num(s.w), fmt_num(s.h))
}

pub fn format_rect(r: Rect) -> String {
    format!(
        "{{{{{}, {}}}, {{{}, {}}}}}",
        fmt_num(r.x),
        fmt_num(r.y),
        fmt_num(r.w),
        fmt_num(r.h)
    )
}

pub fn format_insets(i: Insets) -> String {
    format!(
        "{{{}, {}, {}, {}}}",
        fmt_num(i.top),
        fmt_num(i.left),
        fmt_num(i.bottom),
        fmt_num(i.right)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rect() {
        let r = parse_rect("{{0, 0}, {390, 844}}").unwrap();
        assert_eq!(
            r,
            Rect {
                x: 0.0,
                y: 0.0,
                w: 390.0,
                h: 844.0
            }
        );
    }

    #[test]
    fn test_parse_rect_fractional_and_negative() {
        let r = parse_rect("{{-12.5, 3.25}, {100, 44.333333333333336}}").unwrap();
        assert_eq!(r.x, -12.5);
        assert_eq!(r.y, 3.25);
        assert_eq!(r.w, 100.0);
        assert!((r.h - 44.333333333333336).abs() < 1e-12);
    }

    #[test]
    fn test_parse_point_and_size() {
        assert_eq!(parse_point("{10, 20}").unwrap(), Point { x: 10.0, y: 20.0 });
        assert_eq!(parse_size("{390, 844}").unwrap(), Size { w: 390.0, h: 844.0 });
    }

    #[test]
    fn test_parse_insets() {
        let i = parse_insets("{8, 16, 8, 16}").unwrap();
        assert_eq!(
            i,
            Insets {
                top: 8.0,
                left: 16.0,
                bottom: 8.0,
                right: 16.0
            }
        );
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(parse_point("{1, 2, 3}").is_err());
        assert!(parse_rect("{{1, 2}, {3}}").is_err());
        assert!(parse_insets("{}").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_rect("not geometry").is_err());
        assert!(parse_point("{1..2, 3}").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        let rect = Rect {
            x: 0.0,
            y: 47.5,
            w: 390.0,
            h: 844.0,
        };
        assert_eq!(format_rect(rect), "{{0, 47.5}, {390, 844}}");
        assert_eq!(parse_rect(&format_rect(rect)).unwrap(), rect);

        let insets = Insets {
            top: 1.0,
            left: 2.0,
            bottom: 3.0,
            right: 4.0,
        };
        assert_eq!(format_insets(insets), "{1, 2, 3, 4}");
        assert_eq!(parse_insets(&format_insets(insets)).unwrap(), insets);
    }
}
