use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Address, FundMeError};

/// The single owner recorded at construction. There is no setter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn require_owner(&self, caller: &Address) -> Result<(), FundMeError> {
        if *caller != self.owner {
            warn!(caller = %caller, owner = %self.owner, "rejected call from non-owner");
            return Err(FundMeError::NotOwner { owner: self.owner });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_owner_passes() {
        let owner = Address::new([1u8; 20]);
        let stranger = Address::new([2u8; 20]);
        let access = Ownable::new(owner);

        access.require_owner(&owner).unwrap();
        let err = access.require_owner(&stranger).unwrap_err();
        assert_eq!(err, FundMeError::NotOwner { owner });
    }
}
