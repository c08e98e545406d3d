//! Text of the individual remote commands the engine issues.
//!
//! These strings are a versioned wire contract with the remote shell:
//! a destination file is created empty once, then grown by appending
//! base64 blocks, and check/decode scripts are invoked with the path of
//! an uploaded hash-file.

/// Empirical ceiling on the characters a single remote command may carry.
pub const COMMAND_BUDGET: usize = 8000;

/// Command that truncates (or creates) `dest` as an empty file.
///
/// Issued once before the first append so a failed prior run can never
/// leave stale content under the same scratch name.
pub fn truncate_file(dest: &str) -> String {
    format!(
        "Set-Content -Path \"{}\" -Value ([String]::Empty) -Encoding Ascii",
        escape(dest)
    )
}

/// Command that appends one base64 `block` to `dest`.
pub fn append_chunk(dest: &str, block: &str) -> String {
    format!(
        "Add-Content -Path \"{}\" -Value \"{}\" -Encoding Ascii",
        escape(dest),
        block
    )
}

/// Character overhead of an append command for `dest`, excluding the block.
///
/// The chunked encoder subtracts this from the command budget to size its
/// blocks.
pub fn append_overhead(dest: &str) -> usize {
    append_chunk(dest, "").len()
}

/// Command that runs a remote script against an uploaded hash-file.
pub fn invoke_script(script: &str, hash_file: &str) -> String {
    format!(
        "& \"{}\" -hash_file \"{}\"",
        escape(script),
        escape(hash_file)
    )
}

/// Escapes a path for embedding in a double-quoted command argument.
///
/// `$env:` is left intact on purpose: callers may address the remote
/// temp directory symbolically and rely on the shell expanding it.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '`' => out.push_str("``"),
            '"' => out.push_str("`\""),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_mentions_path_and_empty_value() {
        let cmd = truncate_file("C:\\tmp\\x.b64");
        assert!(cmd.starts_with("Set-Content"));
        assert!(cmd.contains("C:\\tmp\\x.b64"));
        assert!(cmd.contains("[String]::Empty"));
    }

    #[test]
    fn append_carries_block_verbatim() {
        let cmd = append_chunk("C:\\tmp\\x.b64", "QUJD");
        assert!(cmd.starts_with("Add-Content"));
        assert!(cmd.contains("-Value \"QUJD\""));
    }

    #[test]
    fn append_overhead_matches_empty_block() {
        let dest = "C:\\tmp\\x.b64";
        assert_eq!(append_overhead(dest), append_chunk(dest, "").len());
        assert_eq!(
            append_chunk(dest, "AAAA").len(),
            append_overhead(dest) + 4
        );
    }

    #[test]
    fn invoke_script_passes_hash_file() {
        let cmd = invoke_script("C:\\scripts\\check.ps1", "$env:TEMP\\hf.txt");
        assert!(cmd.contains("-hash_file \"$env:TEMP\\hf.txt\""));
    }

    #[test]
    fn quotes_in_paths_are_escaped() {
        let cmd = truncate_file("C:\\odd\"name");
        assert!(cmd.contains("C:\\odd`\"name"));
    }
}
