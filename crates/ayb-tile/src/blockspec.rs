//! C9: parses the textual block-spec grammar
//! `SPEC := ITEM (COMMA ITEM)*`, `ITEM := COUNT ('R' | 'C' | 'I')`
//! (case-insensitive) into an ordered sequence of [`DataBlock`]s.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockSpecError {
    /// Parse or semantic failure: unknown letter, zero count, empty
    /// item, or a `CONCAT` with no preceding block.
    #[error("malformed block-spec")]
    BadBlockSpec,
    /// The spec parsed but contained no `READ` block.
    #[error("block-spec has no READ blocks")]
    NoBlocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBlockType {
    Read,
    Concat,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock {
    pub block_type: DataBlockType,
    pub num: u32,
}

/// Parses a block-spec string such as `"3R,2C,2I,3R"`.
pub fn parse_blockspec(spec: &str) -> Result<Vec<DataBlock>, BlockSpecError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(BlockSpecError::NoBlocks);
    }

    let mut blocks = Vec::new();
    let mut saw_read_or_concat = false;
    for item in spec.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(BlockSpecError::BadBlockSpec);
        }
        let (digits, letter) = item.split_at(item.len() - 1);
        let num: u32 = digits.parse().map_err(|_| BlockSpecError::BadBlockSpec)?;
        if num == 0 {
            return Err(BlockSpecError::BadBlockSpec);
        }
        let block_type = match letter.to_ascii_uppercase().as_str() {
            "R" => DataBlockType::Read,
            "C" => DataBlockType::Concat,
            "I" => DataBlockType::Ignore,
            _ => return Err(BlockSpecError::BadBlockSpec),
        };
        if block_type == DataBlockType::Concat && !saw_read_or_concat {
            return Err(BlockSpecError::BadBlockSpec);
        }
        if block_type != DataBlockType::Ignore {
            saw_read_or_concat = true;
        }
        blocks.push(DataBlock { block_type, num });
    }

    if !blocks.iter().any(|b| b.block_type == DataBlockType::Read) {
        return Err(BlockSpecError::NoBlocks);
    }

    Ok(blocks)
}
