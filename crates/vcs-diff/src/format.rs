//! Unified diff output.
//!
//! Patches are bytes, not `String`: file contents need not be UTF-8, and a
//! patch must reproduce them exactly when applied.

use bstr::{BStr, BString, ByteSlice, ByteVec};
use vcs_object::FileMode;

use crate::{DiffLine, FileDiff, FileStatus, Hunk};

const NO_NEWLINE: &[u8] = b"\\ No newline at end of file\n";
const ABBREV: usize = 7;

fn abbrev(oid: Option<vcs_hash::ObjectId>) -> String {
    match oid {
        Some(oid) => oid.to_short_hex(ABBREV),
        None => "0".repeat(ABBREV),
    }
}

fn mode(mode: FileMode) -> String {
    format!("{:06o}", mode.raw())
}

fn line(out: &mut BString, text: impl AsRef<[u8]>) {
    out.push_str(text.as_ref());
    out.push_byte(b'\n');
}

/// Render one file's change in `diff --git` form.
pub fn format_unified(file: &FileDiff) -> BString {
    let mut out = BString::default();
    let a = file.old_path.as_bstr();
    let b = file.new_path.as_bstr();
    line(&mut out, format!("diff --git a/{a} b/{b}"));

    match file.status {
        FileStatus::Added => {
            if let Some(m) = file.new_mode {
                line(&mut out, format!("new file mode {}", mode(m)));
            }
        }
        FileStatus::Deleted => {
            if let Some(m) = file.old_mode {
                line(&mut out, format!("deleted file mode {}", mode(m)));
            }
        }
        _ => {
            if let (Some(o), Some(n)) = (file.old_mode, file.new_mode) {
                if o != n {
                    line(&mut out, format!("old mode {}", mode(o)));
                    line(&mut out, format!("new mode {}", mode(n)));
                }
            }
        }
    }
    if matches!(file.status, FileStatus::Renamed | FileStatus::Copied) {
        let verb = if file.status == FileStatus::Renamed { "rename" } else { "copy" };
        line(&mut out, format!("similarity index {}%", file.similarity.unwrap_or(100)));
        line(&mut out, format!("{verb} from {a}"));
        line(&mut out, format!("{verb} to {b}"));
    }

    if file.old_oid != file.new_oid {
        let mut index = format!("index {}..{}", abbrev(file.old_oid), abbrev(file.new_oid));
        if let (Some(o), Some(n)) = (file.old_mode, file.new_mode) {
            if o == n {
                index.push(' ');
                index.push_str(&mode(o));
            }
        }
        line(&mut out, index);
    }

    let old_name = match file.status {
        FileStatus::Added => BString::from("/dev/null"),
        _ => BString::from(format!("a/{a}")),
    };
    let new_name = match file.status {
        FileStatus::Deleted => BString::from("/dev/null"),
        _ => BString::from(format!("b/{b}")),
    };
    if file.is_binary {
        line(&mut out, format!("Binary files {old_name} and {new_name} differ"));
        return out;
    }
    if file.hunks.is_empty() {
        return out;
    }
    line(&mut out, format!("--- {old_name}"));
    line(&mut out, format!("+++ {new_name}"));
    for hunk in &file.hunks {
        format_hunk(&mut out, hunk);
    }
    out
}

fn format_hunk(out: &mut BString, hunk: &Hunk) {
    line(
        out,
        format!(
            "@@ -{},{} +{},{} @@",
            hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
        ),
    );
    for l in &hunk.lines {
        let (prefix, text) = match l {
            DiffLine::Context(t) => (b' ', t),
            DiffLine::Addition(t) => (b'+', t),
            DiffLine::Deletion(t) => (b'-', t),
        };
        out.push_byte(prefix);
        out.push_str(text);
        if !text.ends_with(b"\n") {
            out.push_byte(b'\n');
            out.push_str(NO_NEWLINE);
        }
    }
}

/// Concatenated sections for every file.
pub fn format_patch(files: &[FileDiff]) -> BString {
    let mut out = BString::default();
    for file in files {
        out.push_str(format_unified(file));
    }
    out
}

/// `path | +adds -dels` lines, one per file.
pub fn format_stat(files: &[FileDiff]) -> BString {
    let mut out = BString::default();
    for file in files {
        let path: &BStr = file.path();
        line(
            &mut out,
            format!("{path} | +{} -{}", file.insertions(), file.deletions()),
        );
    }
    out
}
