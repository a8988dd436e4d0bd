use crate::domain::LimitSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    Request(u16),
    Stop,
}

/// How large the next page request should be. Pages can come back short, so
/// this is asked again before every request rather than planned up front.
#[derive(Debug, Clone, Copy)]
pub struct LimitPolicy {
    limit: LimitSpec,
    ceiling: u16,
}

impl LimitPolicy {
    pub fn new(limit: LimitSpec, ceiling: u16) -> Self {
        Self {
            limit,
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> u16 {
        self.ceiling
    }

    pub fn limit(&self) -> LimitSpec {
        self.limit
    }

    pub fn next_page(&self, collected: usize) -> NextPage {
        match self.limit {
            LimitSpec::Unlimited => NextPage::Request(self.ceiling),
            LimitSpec::AtMost(n) => {
                let remaining = n.saturating_sub(collected);
                if remaining == 0 {
                    return NextPage::Stop;
                }
                let size = remaining.min(usize::from(self.ceiling));
                NextPage::Request(size as u16)
            }
        }
    }

    pub fn is_satisfied(&self, collected: usize) -> bool {
        self.limit.bound().is_some_and(|n| collected >= n)
    }
}
