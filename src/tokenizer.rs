use memchr::Memchr;

/// Splits `line` on a single ASCII separator. No quoting, escaping or trimming.
/// An empty line yields one empty field.
pub fn split_fields(line: &str, separator: u8) -> Fields<'_> {
    debug_assert!(separator.is_ascii());
    Fields {
        line,
        hits: memchr::memchr_iter(separator, line.as_bytes()),
        start: 0,
        done: false,
    }
}

/// Iterator returned by [`split_fields`].
pub struct Fields<'a> {
    line: &'a str,
    hits: Memchr<'a>,
    start: usize,
    done: bool,
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        match self.hits.next() {
            Some(at) => {
                // separator is ASCII, so `at` and `at + 1` are char boundaries
                let field = &self.line[self.start..at];
                self.start = at + 1;
                Some(field)
            }
            None => {
                self.done = true;
                Some(&self.line[self.start..])
            }
        }
    }
}

/// Strips one trailing `\n` or `\r\n`.
pub(crate) fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}
