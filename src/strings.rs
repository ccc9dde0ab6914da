//! String sorter facade.

use crossbeam_channel::Receiver;

use crate::codec::StringCodec;
use crate::error::SortError;
use crate::sorter::{ExternalSorter, SortConfig};

pub type StringLess = fn(&String, &String) -> bool;

/// [`ExternalSorter`] fixed to UTF-8 strings with lexicographic order.
pub type StringSorter = ExternalSorter<String, StringCodec, StringLess>;

fn lexicographic(a: &String, b: &String) -> bool {
    a < b
}

/// Creates a sorter over strings with the default framed codec and
/// lexicographic ordering. Everything else behaves as
/// [`ExternalSorter::new`].
pub fn new_strings(
    input: Receiver<String>,
    config: Option<SortConfig>,
) -> (Option<StringSorter>, Receiver<String>, Receiver<SortError>) {
    ExternalSorter::new(input, StringCodec, lexicographic as StringLess, config)
}
