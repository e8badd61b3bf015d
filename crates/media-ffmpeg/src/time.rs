use crate::error::{MediaFfmpegError, Result};

/// Rational value as printed by ffprobe (`time_base`, `r_frame_rate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Creates a rational with a positive denominator and non-zero numerator.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::Rational;
    ///
    /// let rate = Rational::new(30_000, 1_001).expect("valid");
    /// assert_eq!(rate.den, 1_001);
    /// ```
    pub fn new(num: i32, den: i32) -> Result<Self> {
        if den <= 0 || num == 0 {
            return Err(MediaFfmpegError::InvalidRational { num, den });
        }
        Ok(Self { num, den })
    }

    /// Parses ffprobe's `num/den` notation. `0/0` and `N/A` yield `None`.
    ///
    /// # Example
    /// ```
    /// use media_ffmpeg::Rational;
    ///
    /// assert_eq!(Rational::parse("25/1").expect("valid").map(|r| r.num), Some(25));
    /// assert!(Rational::parse("0/0").expect("valid").is_none());
    /// ```
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let input = input.trim();
        if input.is_empty() || input == "N/A" || input == "0/0" {
            return Ok(None);
        }
        let (num, den) = input.split_once('/').ok_or_else(|| MediaFfmpegError::Parse {
            context: "rational",
            value: input.to_string(),
        })?;
        let num = parse_i32(num, "rational num")?;
        let den = parse_i32(den, "rational den")?;
        Self::new(num, den).map(Some)
    }

    /// Returns the value as floating point.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

fn parse_i32(value: &str, context: &'static str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: value.to_string(),
        })
}
