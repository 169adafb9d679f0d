use std::io;
use std::path::Path;

use miette::{miette, Report, Severity};

// Image errors

pub fn image_unreadable(path: &Path, e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::io",
        help = "check that the path exists and is a readable file",
        "Could not read image {}: {e}",
        path.display(),
    )
}

pub fn image_empty() -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::empty",
        help = "an image must begin with a 16-bit origin address",
        "Image contains no words",
    )
}

pub fn image_misaligned(len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::misaligned",
        help = "images are sequences of big-endian 16-bit words",
        "Image is not aligned to 16 bits ({len} bytes)",
    )
}
