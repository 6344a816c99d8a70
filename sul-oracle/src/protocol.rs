//! The line protocol spoken with a system under learning. Every outbound command is a single
//! line and every command except [`RESET`] is answered by exactly one line.
use itertools::Itertools;
use sul_core::prelude::*;
use thiserror::Error;

/// The literal line that brings the system under learning back into its initial state.
pub const RESET: &str = "RESET";

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ProtocolError {
    #[error("received number of output symbols not equal to number of input symbols ({expected} input symbols vs {received} output symbols)")]
    LengthMismatch { expected: usize, received: usize },
    #[error("symbol `{symbol}` contains the delimiter {delimiter:?} or a line break and cannot be framed")]
    DelimiterInSymbol { symbol: String, delimiter: String },
    #[error("protocol delimiters must not be empty")]
    EmptyDelimiter,
}

impl ProtocolError {
    /// Checks that `received` output symbols were produced for `expected` input symbols.
    pub fn check_length(expected: usize, received: usize) -> Result<(), ProtocolError> {
        if expected == received {
            Ok(())
        } else {
            Err(ProtocolError::LengthMismatch { expected, received })
        }
    }
}

/// Encodes words of input symbols into lines and decodes response lines into words of output
/// symbols.
///
/// Symbols are framed by plain delimiters, so a symbol that contains the input delimiter (or a
/// line break) cannot be sent. Instead of silently splitting such a symbol on the other side,
/// encoding fails with [`ProtocolError::DelimiterInSymbol`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LineCodec {
    input_delimiter: String,
    output_delimiter: String,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self {
            input_delimiter: " ".to_string(),
            output_delimiter: " ".to_string(),
        }
    }
}

impl LineCodec {
    pub fn new(
        input_delimiter: impl Into<String>,
        output_delimiter: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let input_delimiter = input_delimiter.into();
        let output_delimiter = output_delimiter.into();
        if input_delimiter.is_empty() || output_delimiter.is_empty() {
            return Err(ProtocolError::EmptyDelimiter);
        }
        Ok(Self {
            input_delimiter,
            output_delimiter,
        })
    }

    pub fn input_delimiter(&self) -> &str {
        &self.input_delimiter
    }

    pub fn output_delimiter(&self) -> &str {
        &self.output_delimiter
    }

    /// Encodes a single symbol for stepwise execution. The result does not contain the
    /// terminating newline.
    pub fn encode_symbol<S: Symbol>(&self, symbol: &S) -> Result<String, ProtocolError> {
        let text = symbol.show();
        if text.contains('\n') || text.contains('\r') {
            return Err(ProtocolError::DelimiterInSymbol {
                symbol: text,
                delimiter: "\\n".to_string(),
            });
        }
        Ok(text)
    }

    /// Encodes a whole word as one line, joining the symbols with the input delimiter. The empty
    /// word gives an empty line.
    pub fn encode_word<S: Symbol>(&self, word: &Word<S>) -> Result<String, ProtocolError> {
        let symbols = word
            .iter()
            .map(|sym| {
                let text = self.encode_symbol(sym)?;
                if text.contains(self.input_delimiter.as_str()) {
                    Err(ProtocolError::DelimiterInSymbol {
                        symbol: text,
                        delimiter: self.input_delimiter.clone(),
                    })
                } else {
                    Ok(text)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(symbols.iter().join(&self.input_delimiter))
    }

    /// Decodes a response line to a single output symbol. A line that holds no symbol or
    /// several symbols separated by the output delimiter is a response of the wrong length.
    pub fn decode_symbol(&self, line: &str) -> Result<String, ProtocolError> {
        let line = strip_line_end(line);
        let received = if line.is_empty() {
            0
        } else {
            line.split(self.output_delimiter.as_str()).count()
        };
        ProtocolError::check_length(1, received)?;
        Ok(line.to_string())
    }

    /// Decodes a response line by splitting it on the output delimiter. An empty line is the
    /// response to the empty word and decodes to the empty word. The length of the result is
    /// not checked here, that is up to the caller who knows how many symbols were sent.
    pub fn decode_word(&self, line: &str) -> Word<String> {
        let line = strip_line_end(line);
        if line.is_empty() {
            return Word::epsilon();
        }
        line.split(self.output_delimiter.as_str())
            .map(str::to_string)
            .collect()
    }
}

fn strip_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding() {
        let codec = LineCodec::new(" ", ";").unwrap();
        assert_eq!(
            codec.encode_word(&word!["COMMIT", "CONFIRM"]).unwrap(),
            "COMMIT CONFIRM"
        );
        assert_eq!(codec.encode_word(&Word::<String>::epsilon()).unwrap(), "");
        assert_eq!(codec.encode_symbol(&"ASSOC".to_string()).unwrap(), "ASSOC");
    }

    #[test]
    fn framing_violations() {
        let codec = LineCodec::new(",", ",").unwrap();
        assert_eq!(
            codec.encode_word(&word!["a,b", "c"]),
            Err(ProtocolError::DelimiterInSymbol {
                symbol: "a,b".into(),
                delimiter: ",".into()
            })
        );
        assert!(matches!(
            codec.encode_symbol(&"a\nb".to_string()),
            Err(ProtocolError::DelimiterInSymbol { .. })
        ));
        assert_eq!(LineCodec::new("", ";"), Err(ProtocolError::EmptyDelimiter));
    }

    #[test]
    fn decoding() {
        let codec = LineCodec::new(" ", ";").unwrap();
        assert_eq!(codec.decode_word("OK;NOK\r\n"), word!["OK", "NOK"]);
        assert_eq!(codec.decode_word(""), Word::epsilon());
        assert_eq!(codec.decode_word("a b"), word!["a b"]);
        assert_eq!(codec.decode_symbol("OK\n"), Ok("OK".to_string()));
        assert_eq!(codec.decode_symbol("a b"), Ok("a b".to_string()));
    }

    #[test]
    fn single_symbol_responses() {
        let codec = LineCodec::default();
        assert_eq!(
            codec.decode_symbol("a b"),
            Err(ProtocolError::LengthMismatch {
                expected: 1,
                received: 2
            })
        );
        assert_eq!(
            codec.decode_symbol("\r\n"),
            Err(ProtocolError::LengthMismatch {
                expected: 1,
                received: 0
            })
        );
    }

    #[test]
    fn length_check() {
        assert!(ProtocolError::check_length(3, 3).is_ok());
        let err = ProtocolError::check_length(3, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "received number of output symbols not equal to number of input symbols (3 input symbols vs 2 output symbols)"
        );
    }
}
