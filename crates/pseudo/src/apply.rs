//! Applying parsed operations to the filesystem tree.

use fstree::{FileData, NodePayload, Tree, TreeError};

use crate::parser::PseudoOp;

/// Applies one operation to `tree`.
///
/// [`PseudoOp::Glob`] is not handled here: expanding a glob needs the host
/// scanner, so the build orchestrator intercepts those lines and this
/// function passes them through untouched.
///
/// # Errors
///
/// Tree conflicts surface as [`TreeError`]; the caller attaches the source
/// position.
pub fn apply(tree: &mut Tree, op: &PseudoOp) -> Result<(), TreeError> {
    match op {
        PseudoOp::Dir { path, attrs } => {
            tree.add(path, *attrs, NodePayload::Directory { children: Vec::new() })?;
        }
        PseudoOp::Symlink { path, attrs, target } => {
            tree.add(path, *attrs, NodePayload::Symlink { target: target.clone() })?;
        }
        PseudoOp::HardLink { path, target } => {
            tree.add_hard_link(path, target)?;
        }
        PseudoOp::Device { path, attrs, block, major, minor } => {
            let payload = if *block {
                NodePayload::BlockDevice { major: *major, minor: *minor }
            } else {
                NodePayload::CharDevice { major: *major, minor: *minor }
            };
            tree.add(path, *attrs, payload)?;
        }
        PseudoOp::Fifo { path, attrs } => {
            tree.add(path, *attrs, NodePayload::Fifo)?;
        }
        PseudoOp::Socket { path, attrs } => {
            tree.add(path, *attrs, NodePayload::Socket)?;
        }
        PseudoOp::File { path, attrs, source } => {
            tree.add(
                path,
                *attrs,
                NodePayload::File {
                    data: FileData::Host(source.clone()),
                    no_fragment: false,
                },
            )?;
        }
        PseudoOp::Glob { .. } => {}
    }
    Ok(())
}
