//! Query template engine
//!
//! Splices a block hash (and optional variable values) into a query template
//! at exact byte offsets. Everything here is pure: identical inputs always
//! produce the identical byte string, which is what lets the proposal
//! lifecycle re-derive and check request CIDs without trusting the caller.

use crate::error::{BridgeError, Result};
use crate::types::{SpliceMode, VariableSplice, BLOCK_HASH_STRING_LEN};

/// A query decomposed back into its template, block hash, and variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitQuery<'a> {
    /// The 66-character block hash string embedded in the query.
    pub block_hash: &'a str,
    /// Variable values present in the query, in slot order.
    pub variables: [Option<&'a str>; 2],
}

/// Build the concrete query for `template` with `block_hash` (and variable
/// values, for multi-variable bridges) spliced in.
///
/// `variables` slots must be empty for fixed-splice bridges. An empty value
/// skips that slot and keeps the template text as-is; the second slot is only
/// reachable when the first is filled.
pub fn build_query(
    template: &str,
    splice: &SpliceMode,
    block_hash: &str,
    variables: [&str; 2],
) -> Result<String> {
    check_block_hash(block_hash)?;
    check_splice(template, splice)?;

    let offset = splice.block_hash_offset() as usize;
    let mut query =
        String::with_capacity(template.len() + BLOCK_HASH_STRING_LEN + variables[0].len() + variables[1].len());
    query.push_str(&template[..offset]);
    query.push_str(block_hash);

    match splice {
        SpliceMode::FixedSplice { .. } => {
            if variables.iter().any(|v| !v.is_empty()) {
                return Err(BridgeError::Validation(
                    "fixed-splice bridge accepts no query variables".to_string(),
                ));
            }
            query.push_str(&template[offset..]);
        }
        SpliceMode::MultiVariable {
            variables: descriptors,
            ..
        } => {
            if variables[0].is_empty() {
                if !variables[1].is_empty() {
                    return Err(BridgeError::Validation(
                        "second query variable requires the first".to_string(),
                    ));
                }
                query.push_str(&template[offset..]);
                return Ok(query);
            }
            check_variable(&descriptors[0], variables[0], 0)?;
            let v0 = descriptors[0].offset as usize;
            query.push_str(&template[offset..v0]);
            query.push_str(variables[0]);
            if variables[1].is_empty() {
                query.push_str(&template[v0..]);
                return Ok(query);
            }
            check_variable(&descriptors[1], variables[1], 1)?;
            let v1 = descriptors[1].offset as usize;
            query.push_str(&template[v0..v1]);
            query.push_str(variables[1]);
            query.push_str(&template[v1..]);
        }
    }

    Ok(query)
}

/// Decompose `query` against `template`, verifying every template segment
/// byte-exactly and returning the embedded block hash and variable values.
///
/// Any deviation from the template outside the splice points is a
/// consistency error: the query was built from different inputs than claimed.
pub fn split_query<'a>(
    template: &str,
    splice: &SpliceMode,
    query: &'a str,
) -> Result<SplitQuery<'a>> {
    check_splice(template, splice)?;

    let offset = splice.block_hash_offset() as usize;
    let template_bytes = template.as_bytes();
    let query_bytes = query.as_bytes();

    // Which variable slots are present is determined by total length alone:
    // slot lengths are fixed per config and strictly accumulate.
    let base_len = template.len() + BLOCK_HASH_STRING_LEN;
    let (present0, present1) = match splice {
        SpliceMode::FixedSplice { .. } => {
            if query.len() != base_len {
                return Err(length_mismatch(query.len(), base_len));
            }
            (false, false)
        }
        SpliceMode::MultiVariable {
            variables: descriptors,
            ..
        } => {
            let l0 = descriptors[0].length as usize;
            let l1 = descriptors[1].length as usize;
            if query.len() == base_len {
                (false, false)
            } else if l0 > 0 && query.len() == base_len + l0 {
                (true, false)
            } else if l0 > 0 && l1 > 0 && query.len() == base_len + l0 + l1 {
                (true, true)
            } else {
                return Err(length_mismatch(query.len(), base_len));
            }
        }
    };

    let mut q = 0usize;
    let mut t = 0usize;

    let expect_segment = |end: usize, q_pos: &mut usize, t_pos: &mut usize| -> Result<()> {
        let segment = &template_bytes[*t_pos..end];
        if &query_bytes[*q_pos..*q_pos + segment.len()] != segment {
            return Err(BridgeError::Consistency(
                "query does not match template outside splice points".to_string(),
            ));
        }
        *q_pos += segment.len();
        *t_pos = end;
        Ok(())
    };

    expect_segment(offset, &mut q, &mut t)?;
    let block_hash = str_slice(query, q, q + BLOCK_HASH_STRING_LEN)?;
    check_block_hash(block_hash)?;
    q += BLOCK_HASH_STRING_LEN;

    let mut variables: [Option<&str>; 2] = [None, None];
    if let SpliceMode::MultiVariable {
        variables: descriptors,
        ..
    } = splice
    {
        if present0 {
            expect_segment(descriptors[0].offset as usize, &mut q, &mut t)?;
            let l0 = descriptors[0].length as usize;
            variables[0] = Some(str_slice(query, q, q + l0)?);
            q += l0;
        }
        if present1 {
            expect_segment(descriptors[1].offset as usize, &mut q, &mut t)?;
            let l1 = descriptors[1].length as usize;
            variables[1] = Some(str_slice(query, q, q + l1)?);
            q += l1;
        }
    }
    expect_segment(template.len(), &mut q, &mut t)?;

    Ok(SplitQuery {
        block_hash,
        variables,
    })
}

/// Validate splice offsets against the template. Shared by build and split,
/// and by the registry when a bridge is created.
pub fn check_splice(template: &str, splice: &SpliceMode) -> Result<()> {
    let offset = splice.block_hash_offset() as usize;
    check_offset(template, offset, "block hash")?;
    if let SpliceMode::MultiVariable { variables, .. } = splice {
        let v0 = variables[0].offset as usize;
        let v1 = variables[1].offset as usize;
        check_offset(template, v0, "first variable")?;
        check_offset(template, v1, "second variable")?;
        if v0 < offset || v1 < v0 {
            return Err(BridgeError::Validation(
                "variable splice offsets must not precede the block hash splice".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_offset(template: &str, offset: usize, what: &str) -> Result<()> {
    if offset > template.len() {
        return Err(BridgeError::Validation(format!(
            "{} splice offset {} beyond template length {}",
            what,
            offset,
            template.len()
        )));
    }
    if !template.is_char_boundary(offset) {
        return Err(BridgeError::Validation(format!(
            "{} splice offset {} is not a character boundary",
            what, offset
        )));
    }
    Ok(())
}

fn check_block_hash(block_hash: &str) -> Result<()> {
    if block_hash.len() != BLOCK_HASH_STRING_LEN {
        return Err(BridgeError::Validation(format!(
            "block hash must be {} characters, got {}",
            BLOCK_HASH_STRING_LEN,
            block_hash.len()
        )));
    }
    if !block_hash.starts_with("0x") || !block_hash[2..].bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(BridgeError::Validation(
            "block hash must be 0x-prefixed hex".to_string(),
        ));
    }
    Ok(())
}

fn check_variable(descriptor: &VariableSplice, value: &str, slot: usize) -> Result<()> {
    if descriptor.length == 0 {
        return Err(BridgeError::Validation(format!(
            "variable slot {} is disabled for this bridge",
            slot
        )));
    }
    if value.len() != descriptor.length as usize {
        return Err(BridgeError::Validation(format!(
            "variable slot {} value must be {} bytes, got {}",
            slot, descriptor.length, value.len()
        )));
    }
    Ok(())
}

fn str_slice(query: &str, start: usize, end: usize) -> Result<&str> {
    query.get(start..end).ok_or_else(|| {
        BridgeError::Consistency("query splice segment is not valid UTF-8 text".to_string())
    })
}

fn length_mismatch(got: usize, base: usize) -> BridgeError {
    BridgeError::Consistency(format!(
        "query length {} does not match any splice layout (template plus hash is {})",
        got, base
    ))
}
