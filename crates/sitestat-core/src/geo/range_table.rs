use std::net::Ipv4Addr;

/// An inclusive IPv4 interval tagged with an ISO-2 country code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub start: u32,
    pub end: u32,
    pub country: String,
}

impl IpRange {
    pub fn contains(&self, ip: u32) -> bool {
        self.start <= ip && ip <= self.end
    }
}

/// Ranges kept sorted ascending by `start`.
///
/// Built once during the bulk load and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    ranges: Vec<IpRange>,
}

impl RangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `range` and move it left until its predecessor starts no later
    /// than it does. O(n) per insert; only runs during loading.
    pub fn insert(&mut self, range: IpRange) {
        self.ranges.push(range);
        let mut i = self.ranges.len() - 1;
        while i > 0 && self.ranges[i].start < self.ranges[i - 1].start {
            self.ranges.swap(i, i - 1);
            i -= 1;
        }
    }

    /// Binary search for the range containing `ip`.
    pub fn lookup(&self, ip: u32) -> Option<&IpRange> {
        let mut lo = 0usize;
        let mut hi = self.ranges.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let range = &self.ranges[mid];
            if range.contains(ip) {
                return Some(range);
            }
            if ip < range.start {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        None
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Convert a dotted quad to its big-endian integer (first octet in bits 31-24).
///
/// Returns `None` for anything that is not an IPv4 address, IPv6 included.
pub fn ip_to_int(ip: &str) -> Option<u32> {
    ip.trim().parse::<Ipv4Addr>().ok().map(u32::from)
}

pub fn int_to_ip(ip: u32) -> String {
    Ipv4Addr::from(ip).to_string()
}
