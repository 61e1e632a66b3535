use super::*;
use std::net::{IpAddr, Ipv4Addr};

fn addr(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
}

#[test]
fn allows_up_to_the_configured_burst() {
    let limiter = RateLimiter::new(3);
    let a = addr(1);
    assert!(limiter.check(a));
    assert!(limiter.check(a));
    assert!(limiter.check(a));
    assert!(!limiter.check(a));
}

#[test]
fn tracks_addresses_independently() {
    let limiter = RateLimiter::new(1);
    assert!(limiter.check(addr(1)));
    assert!(!limiter.check(addr(1)));
    assert!(limiter.check(addr(2)));
}

#[test]
fn sweep_forgets_stale_buckets() {
    let limiter = RateLimiter::new(1);
    assert!(limiter.check(addr(1)));
    limiter.sweep(Duration::from_secs(0));
    assert!(limiter.check(addr(1)));
}
