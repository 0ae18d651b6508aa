// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interpretation of dm-cache status lines.
//!
//! See Documentation/admin-guide/device-mapper/cache.rst in the kernel
//! tree for the format.

use std::str::FromStr;

use crate::{
    core::TargetStatus,
    result::{DmError, DmResult, ErrorEnum},
    units::{DataBlocks, MetaBlocks, Sectors},
};

/// The target type name of a dm-cache target.
pub const CACHE_TARGET_NAME: &str = "cache";

/// The number of positional fields that open every working cache status
/// line, counting each used/total pair as one field.
const CACHE_STATUS_FIXED_FIELDS: usize = 11;

/// Return the whitespace-separated fields of a status line, or an error
/// if there are fewer than `number` of them.
fn get_status_line_fields(status_line: &str, number: usize) -> DmResult<Vec<&str>> {
    let status_vals = status_line.split_whitespace().collect::<Vec<_>>();
    let length = status_vals.len();
    if length < number {
        let err_msg = format!(
            "Insufficient number of fields for status; requires at least {number}, found only {length} in status line \"{status_line}\""
        );
        return Err(DmError::Dm(ErrorEnum::Invalid, err_msg));
    }
    Ok(status_vals)
}

/// Parse a value or return an error naming what was being parsed.
fn parse_value<T>(val: &str, desc: &str) -> DmResult<T>
where
    T: FromStr,
{
    val.parse::<T>().map_err(|_| {
        let err_msg = format!("failed to parse value for \"{desc}\" from input \"{val}\"");
        DmError::Dm(ErrorEnum::Invalid, err_msg)
    })
}

/// Parse a "<used>/<total>" pair.
fn parse_usage_pair(val: &str, desc: &str) -> DmResult<(u64, u64)> {
    let (used, total) = val.split_once('/').ok_or_else(|| {
        let err_msg = format!("expected a <used>/<total> pair for \"{desc}\", found \"{val}\"");
        DmError::Dm(ErrorEnum::Invalid, err_msg)
    })?;
    Ok((
        parse_value(used, &format!("used {desc}"))?,
        parse_value(total, &format!("total {desc}"))?,
    ))
}

/// Used divided by total, or 0 for an empty pool.
fn fraction(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    }
}

/// Hits over all accesses. Defined as 0 when there were no hits, so an
/// idle cache does not divide by zero.
fn hit_ratio(hits: u64, misses: u64) -> f64 {
    if hits == 0 {
        0.0
    } else {
        hits as f64 / (hits as f64 + misses as f64)
    }
}

/// Cache usage
///
/// Used never exceeding total is not checked; a malformed line may
/// violate it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheDevUsage {
    /// The metadata block size, should always be equal to META_BLOCK_SIZE.
    /// At time of writing, all metadata blocks have the same size.
    pub meta_block_size: Sectors,
    /// The number of metadata blocks in use
    pub used_meta: MetaBlocks,
    /// The number of metadata blocks available
    pub total_meta: MetaBlocks,
    /// The cache block size
    pub cache_block_size: Sectors,
    /// Used cache blocks
    pub used_cache: DataBlocks,
    /// Total cache blocks
    pub total_cache: DataBlocks,
}

impl CacheDevUsage {
    /// The fraction of cache blocks in use, between 0 and 1.
    pub fn cache_used_fraction(&self) -> f64 {
        fraction(*self.used_cache, *self.total_cache)
    }

    /// The fraction of metadata blocks in use, between 0 and 1.
    pub fn meta_used_fraction(&self) -> f64 {
        fraction(*self.used_meta, *self.total_meta)
    }
}

/// Cache dev performance data
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheDevPerformance {
    /// Number of times a READ bio has been mapped to the cache
    pub read_hits: u64,
    /// Number of times a READ bio has been mapped to the origin
    pub read_misses: u64,
    /// Number of times a WRITE bio has been mapped to the cache
    pub write_hits: u64,
    /// Number of times a WRITE bio has been mapped to the origin
    pub write_misses: u64,
    /// Number of times a block has been removed from the cache
    pub demotions: u64,
    /// Number of times a block has been moved to the cache
    pub promotions: u64,
    /// Number of blocks in the cache that differ from the origin
    pub dirty: u64,
}

impl CacheDevPerformance {
    /// The read hit ratio, between 0 and 1.
    pub fn read_hit_ratio(&self) -> f64 {
        hit_ratio(self.read_hits, self.read_misses)
    }

    /// The write hit ratio, between 0 and 1.
    pub fn write_hit_ratio(&self) -> f64 {
        hit_ratio(self.write_hits, self.write_misses)
    }
}

/// Status values of a cache device when it is working
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheDevWorkingStatus {
    /// A struct recording block usage for all devices
    pub usage: CacheDevUsage,
    /// A struct recording cache dev performance
    pub performance: CacheDevPerformance,
    /// The tokens that follow the fixed fields, unparsed: feature args,
    /// core args, policy name, policy args, metadata mode, and the
    /// needs_check marker, in the kernel's order.
    pub remainder: Vec<String>,
}

/// The status of a cache target
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CacheDevStatus {
    /// The cache has not failed utterly
    Working(Box<CacheDevWorkingStatus>),
    /// Devicemapper has reported that it could not obtain the status
    Error,
    /// The cache is in a failed condition
    Fail,
}

impl FromStr for CacheDevStatus {
    type Err = DmError;

    fn from_str(status_line: &str) -> DmResult<CacheDevStatus> {
        if status_line.starts_with("Error") {
            return Ok(CacheDevStatus::Error);
        }

        if status_line.starts_with("Fail") {
            return Ok(CacheDevStatus::Fail);
        }

        let status_vals = get_status_line_fields(status_line, CACHE_STATUS_FIXED_FIELDS)?;

        let usage = {
            let (used_meta, total_meta) = parse_usage_pair(status_vals[1], "meta blocks")?;
            let (used_cache, total_cache) = parse_usage_pair(status_vals[3], "cache blocks")?;
            CacheDevUsage {
                meta_block_size: Sectors(parse_value(status_vals[0], "meta block size")?),
                used_meta: MetaBlocks(used_meta),
                total_meta: MetaBlocks(total_meta),
                cache_block_size: Sectors(parse_value(status_vals[2], "cache block size")?),
                used_cache: DataBlocks(used_cache),
                total_cache: DataBlocks(total_cache),
            }
        };

        let performance = CacheDevPerformance {
            read_hits: parse_value(status_vals[4], "read hits")?,
            read_misses: parse_value(status_vals[5], "read misses")?,
            write_hits: parse_value(status_vals[6], "write hits")?,
            write_misses: parse_value(status_vals[7], "write misses")?,
            demotions: parse_value(status_vals[8], "demotions")?,
            promotions: parse_value(status_vals[9], "promotions")?,
            dirty: parse_value(status_vals[10], "dirty")?,
        };

        let remainder = status_vals[CACHE_STATUS_FIXED_FIELDS..]
            .iter()
            .map(|x| (*x).to_string())
            .collect();

        Ok(CacheDevStatus::Working(Box::new(CacheDevWorkingStatus {
            usage,
            performance,
            remainder,
        })))
    }
}

impl TargetStatus {
    /// Interpret this target's params as a dm-cache status line.
    ///
    /// The params are a status line only if the table was queried for
    /// status, not for its table (DM_STATUS_TABLE).
    pub fn cache_status(&self) -> DmResult<CacheDevStatus> {
        if *self.target_type != *CACHE_TARGET_NAME {
            let err_msg = format!(
                "Expected a cache target entry but found target type {}",
                self.target_type
            );
            return Err(DmError::Dm(ErrorEnum::WrongTarget, err_msg));
        }
        self.params.parse::<CacheDevStatus>()
    }
}
