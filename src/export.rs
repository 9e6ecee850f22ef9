//! Signature exporters.
//!
//! Thin text emitters over [`GeneratedSignature`] maps. Each format
//! targets one consumer: plain AOB lists, pattern+mask pairs, an IDA
//! Python script, a Cheat Engine script skeleton, a C/C++ header, and
//! the x64dbg search box.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SigError};
use crate::types::GeneratedSignature;

/// Map of target name to signature variants, as produced by generation.
pub type SignatureMap = BTreeMap<String, Vec<GeneratedSignature>>;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Standard array-of-bytes text.
    Aob,
    /// Pattern string plus `x`/`?` mask.
    Mask,
    /// IDA Python script.
    Ida,
    /// Cheat Engine AOB script skeleton.
    CheatEngine,
    /// C/C++ header with pattern arrays.
    Cpp,
    /// x64dbg search patterns (no spaces).
    X64dbg,
}

impl ExportFormat {
    /// Parse a wire/CLI format name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "aob" => Ok(ExportFormat::Aob),
            "mask" => Ok(ExportFormat::Mask),
            "ida" => Ok(ExportFormat::Ida),
            "cheatengine" => Ok(ExportFormat::CheatEngine),
            "cpp" => Ok(ExportFormat::Cpp),
            "x64dbg" => Ok(ExportFormat::X64dbg),
            other => Err(SigError::UnknownExportFormat {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Aob => write!(f, "aob"),
            ExportFormat::Mask => write!(f, "mask"),
            ExportFormat::Ida => write!(f, "ida"),
            ExportFormat::CheatEngine => write!(f, "cheatengine"),
            ExportFormat::Cpp => write!(f, "cpp"),
            ExportFormat::X64dbg => write!(f, "x64dbg"),
        }
    }
}

/// Descriptive metadata for one export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFormatInfo {
    /// Wire/CLI identifier.
    pub id: ExportFormat,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Conventional file extension.
    pub extension: &'static str,
}

/// Metadata for every available export format.
pub fn available_formats() -> Vec<ExportFormatInfo> {
    vec![
        ExportFormatInfo {
            id: ExportFormat::Aob,
            name: "Standard AOB",
            description: "Array of Bytes format (0F 84 ?? ?? ?? ??)",
            extension: ".txt",
        },
        ExportFormatInfo {
            id: ExportFormat::Mask,
            name: "Mask Format",
            description: "Pattern + mask string (xx????xx)",
            extension: ".txt",
        },
        ExportFormatInfo {
            id: ExportFormat::Ida,
            name: "IDA Python",
            description: "Ready-to-use IDA Pro script",
            extension: ".py",
        },
        ExportFormatInfo {
            id: ExportFormat::CheatEngine,
            name: "Cheat Engine",
            description: "Cheat Engine AOB script",
            extension: ".CT",
        },
        ExportFormatInfo {
            id: ExportFormat::Cpp,
            name: "C/C++ Header",
            description: "C/C++ header file with pattern arrays",
            extension: ".h",
        },
        ExportFormatInfo {
            id: ExportFormat::X64dbg,
            name: "x64dbg",
            description: "x64dbg pattern format (no spaces)",
            extension: ".txt",
        },
    ]
}

/// Render signatures in the requested format.
pub fn export_signatures(
    signatures: &SignatureMap,
    format: ExportFormat,
    module_name: &str,
) -> String {
    match format {
        ExportFormat::Aob => export_aob(signatures),
        ExportFormat::Mask => export_mask(signatures),
        ExportFormat::Ida => export_ida(signatures),
        ExportFormat::CheatEngine => export_cheatengine(signatures, module_name),
        ExportFormat::Cpp => export_cpp(signatures),
        ExportFormat::X64dbg => export_x64dbg(signatures),
    }
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Target names become identifiers in scripts and headers.
fn safe_name(target: &str) -> String {
    target.replace([' ', '-', '@', '.'], "_")
}

/// Standard AOB text: one pattern per variant with a score comment.
fn export_aob(signatures: &SignatureMap) -> String {
    let mut lines = vec![
        "// sigsmith - AOB Export".to_string(),
        format!("// Generated: {}", timestamp()),
        String::new(),
    ];

    for (target, variants) in signatures {
        lines.push(format!("// === {} ===", target));
        for (i, sig) in variants.iter().enumerate() {
            lines.push(format!(
                "// Variant {} ({:.0}% unique, {} stability)",
                i + 1,
                sig.uniqueness_score * 100.0,
                sig.stability
            ));
            lines.push(sig.pattern.clone());
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// Pattern + mask pairs, wildcards rendered as 00 in the byte string.
fn export_mask(signatures: &SignatureMap) -> String {
    let mut lines = vec![
        "// sigsmith - Mask Format Export".to_string(),
        format!("// Generated: {}", timestamp()),
        String::new(),
    ];

    for (target, variants) in signatures {
        lines.push(format!("// === {} ===", target));
        for (i, sig) in variants.iter().enumerate() {
            let packed = sig.pattern.replace(' ', "").replace("??", "00");
            lines.push(format!(
                "// Variant {} ({:.0}% unique)",
                i + 1,
                sig.uniqueness_score * 100.0
            ));
            lines.push(format!("Pattern: {}", packed));
            lines.push(format!("Mask:    {}", sig.mask));
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// IDA Python script with one finder function per target.
fn export_ida(signatures: &SignatureMap) -> String {
    let mut lines = vec![
        "\"\"\"".to_string(),
        "sigsmith generated IDA Python script".to_string(),
        format!("Generated: {}", timestamp()),
        String::new(),
        "Usage: Run in IDA with File -> Script File".to_string(),
        "\"\"\"".to_string(),
        String::new(),
        "import idc".to_string(),
        "import idaapi".to_string(),
        String::new(),
        String::new(),
        "def find_pattern(pattern):".to_string(),
        "    \"\"\"".to_string(),
        "    Search for byte pattern in IDA.".to_string(),
        "    Pattern format: \"0F 84 ? ? ? ? 8B\"".to_string(),
        "    \"\"\"".to_string(),
        "    # Convert pattern to IDA format (? instead of ??)".to_string(),
        "    ida_pattern = pattern.replace(\"??\", \"?\")".to_string(),
        "    ".to_string(),
        "    addr = idc.find_binary(0, idc.SEARCH_DOWN, ida_pattern)".to_string(),
        "    results = []".to_string(),
        "    ".to_string(),
        "    while addr != idc.BADADDR:".to_string(),
        "        results.append(addr)".to_string(),
        "        addr = idc.find_binary(addr + 1, idc.SEARCH_DOWN, ida_pattern)".to_string(),
        "    ".to_string(),
        "    return results".to_string(),
        String::new(),
        String::new(),
        "# ========== PATTERNS ==========".to_string(),
        String::new(),
    ];

    for (target, variants) in signatures {
        let Some(sig) = variants.first() else {
            continue;
        };
        let name = safe_name(target);

        lines.push(format!("# {}", target));
        lines.push(format!(
            "# Uniqueness: {:.0}%, Stability: {}",
            sig.uniqueness_score * 100.0,
            sig.stability
        ));
        lines.push(format!("{}_PATTERN = \"{}\"", name.to_uppercase(), sig.pattern));
        lines.push(String::new());
        lines.push(format!("def find_{}():", name.to_lowercase()));
        lines.push(format!("    \"\"\"Find {} in the binary.\"\"\"", target));
        lines.push(format!(
            "    return find_pattern({}_PATTERN)",
            name.to_uppercase()
        ));
        lines.push(String::new());
        lines.push(String::new());
    }

    lines.push("# ========== MAIN ==========".to_string());
    lines.push(String::new());
    lines.push("if __name__ == \"__main__\":".to_string());
    lines.push("    print(\"sigsmith pattern scanner\")".to_string());
    lines.push("    print(\"=\" * 40)".to_string());

    for (target, variants) in signatures {
        if variants.is_empty() {
            continue;
        }
        let name = safe_name(target);
        lines.push("    ".to_string());
        lines.push(format!("    matches = find_{}()", name.to_lowercase()));
        lines.push(format!(
            "    print(f\"{}: {{len(matches)}} match(es)\")",
            target
        ));
        lines.push("    for addr in matches:".to_string());
        lines.push("        print(f\"  0x{addr:08X}\")".to_string());
    }

    lines.join("\n")
}

/// Cheat Engine script skeleton with aobscanmodule calls.
fn export_cheatengine(signatures: &SignatureMap, module_name: &str) -> String {
    let mut lines = vec![
        "[ENABLE]".to_string(),
        "// sigsmith generated Cheat Engine script".to_string(),
        format!("// Generated: {}", timestamp()),
        String::new(),
    ];

    for (target, variants) in signatures {
        let Some(sig) = variants.first() else {
            continue;
        };
        let name = safe_name(target);
        lines.push(format!(
            "// {} ({:.0}% unique)",
            target,
            sig.uniqueness_score * 100.0
        ));
        lines.push(format!(
            "aobscanmodule({},{},{})",
            name,
            module_name,
            sig.pattern.replace(' ', "")
        ));
        lines.push(format!("registersymbol({})", name));
        lines.push(String::new());
    }

    lines.push("// ========== CODE CHANGES ==========".to_string());
    lines.push(String::new());

    for (target, variants) in signatures {
        if variants.is_empty() {
            continue;
        }
        let name = safe_name(target);
        lines.push(format!("{}:", name));
        lines.push("  // Add your code modifications here".to_string());
        lines.push("  // db 90 90 90 90 90 90  // NOP".to_string());
        lines.push(String::new());
    }

    lines.push(String::new());
    lines.push("[DISABLE]".to_string());
    lines.push(String::new());

    for (target, variants) in signatures {
        let Some(sig) = variants.first() else {
            continue;
        };
        let name = safe_name(target);
        let original: String = sig.pattern.replace("??", "XX").chars().take(23).collect();
        lines.push(format!("{}:", name));
        lines.push("  // Restore original bytes".to_string());
        lines.push(format!("  // db {}...", original));
        lines.push(String::new());
        lines.push(format!("unregistersymbol({})", name));
        lines.push(String::new());
    }

    lines.join("\n")
}

/// C/C++ header with pattern arrays, mask strings and size defines.
fn export_cpp(signatures: &SignatureMap) -> String {
    let mut lines = vec![
        "/*".to_string(),
        " * sigsmith generated C/C++ header".to_string(),
        format!(" * Generated: {}", timestamp()),
        " *".to_string(),
        " * Usage:".to_string(),
        " *   void* addr = FindPattern(module, Pattern_Name, Mask_Name, Size_Name);".to_string(),
        " */".to_string(),
        String::new(),
        "#ifndef SIGSMITH_PATTERNS_H".to_string(),
        "#define SIGSMITH_PATTERNS_H".to_string(),
        String::new(),
        "#include <stdint.h>".to_string(),
        String::new(),
    ];

    for (target, variants) in signatures {
        let Some(sig) = variants.first() else {
            continue;
        };
        let name = safe_name(target).to_uppercase();

        let byte_tokens: Vec<String> = sig
            .pattern
            .split_whitespace()
            .map(|tok| {
                if tok == "??" {
                    "0x00".to_string()
                } else {
                    format!("0x{}", tok)
                }
            })
            .collect();

        // 8 bytes per line.
        let byte_lines: Vec<String> = byte_tokens
            .chunks(8)
            .map(|chunk| format!("    {}", chunk.join(", ")))
            .collect();

        lines.push(format!("// {}", target));
        lines.push(format!(
            "// Uniqueness: {:.0}%, Stability: {}",
            sig.uniqueness_score * 100.0,
            sig.stability
        ));
        lines.push(format!("static const unsigned char {}_PATTERN[] = {{", name));
        lines.push(byte_lines.join(",\n"));
        lines.push("};".to_string());
        lines.push(String::new());
        lines.push(format!("static const char {}_MASK[] = \"{}\";", name, sig.mask));
        lines.push(String::new());
        lines.push(format!("#define {}_SIZE {}", name, sig.length));
        lines.push(String::new());
        lines.push(String::new());
    }

    lines.push("/*".to_string());
    lines.push(" * Example pattern scanner function:".to_string());
    lines.push(" *".to_string());
    lines.push(" * void* FindPattern(HMODULE module, const unsigned char* pattern,".to_string());
    lines.push(" *                   const char* mask, size_t size) {".to_string());
    lines.push(" *     MODULEINFO info;".to_string());
    lines.push(
        " *     GetModuleInformation(GetCurrentProcess(), module, &info, sizeof(info));"
            .to_string(),
    );
    lines.push(" *".to_string());
    lines.push(" *     unsigned char* base = (unsigned char*)info.lpBaseOfDll;".to_string());
    lines.push(" *     size_t moduleSize = info.SizeOfImage;".to_string());
    lines.push(" *".to_string());
    lines.push(" *     for (size_t i = 0; i < moduleSize - size; i++) {".to_string());
    lines.push(" *         bool found = true;".to_string());
    lines.push(" *         for (size_t j = 0; j < size; j++) {".to_string());
    lines.push(" *             if (mask[j] == 'x' && base[i + j] != pattern[j]) {".to_string());
    lines.push(" *                 found = false;".to_string());
    lines.push(" *                 break;".to_string());
    lines.push(" *             }".to_string());
    lines.push(" *         }".to_string());
    lines.push(" *         if (found) return base + i;".to_string());
    lines.push(" *     }".to_string());
    lines.push(" *     return nullptr;".to_string());
    lines.push(" * }".to_string());
    lines.push(" */".to_string());
    lines.push(String::new());
    lines.push("#endif // SIGSMITH_PATTERNS_H".to_string());

    lines.join("\n")
}

/// x64dbg search patterns: wildcards kept as `??`, spaces removed.
fn export_x64dbg(signatures: &SignatureMap) -> String {
    let mut lines = vec![
        "// sigsmith - x64dbg Pattern Export".to_string(),
        format!("// Generated: {}", timestamp()),
        "//".to_string(),
        "// Usage: Ctrl+B (Search for Pattern) in x64dbg".to_string(),
        "// Paste the pattern without spaces".to_string(),
        String::new(),
    ];

    for (target, variants) in signatures {
        lines.push(format!("// === {} ===", target));
        for (i, sig) in variants.iter().enumerate() {
            lines.push(format!(
                "// Variant {} ({:.0}% unique)",
                i + 1,
                sig.uniqueness_score * 100.0
            ));
            lines.push(sig.pattern.replace(' ', ""));
            lines.push(String::new());
        }
    }

    lines.join("\n")
}
