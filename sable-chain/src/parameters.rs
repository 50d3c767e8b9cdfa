//! Consensus parameters for each Bitcoin network.
//!
//! The parameter registry is read-only data keyed by the `Network` tag:
//! proof-of-work limits, retarget and majority windows, maturity rules,
//! checkpoints, and the BIP9 deployment table. Consensus code reads the
//! table; it never hard-codes a deployment.

mod genesis;

pub use genesis::{genesis_block, genesis_hash, GENESIS_PREVIOUS_BLOCK_HASH};

use std::fmt;

use crate::block;
use crate::work::difficulty::CompactDifficulty;

/// After BIP9, the top three version bits must be `001` for the remaining
/// bits to be read as deployment signals.
pub const VERSION_TOP_BITS: u32 = 0x2000_0000;

/// The mask selecting the BIP9 top bits.
pub const VERSION_TOP_MASK: u32 = 0xe000_0000;

/// The number of ancestor timestamps used for median-time-past.
pub const MEDIAN_TIMESPAN: usize = 11;

/// A Bitcoin network.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// The local regression-test network, with trivial proof of work.
    Regtest,
}

impl Default for Network {
    fn default() -> Network {
        Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Network {
    type Err = crate::SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Mainnet),
            "test" | "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(crate::SerializationError::Parse("unknown network name")),
        }
    }
}

impl Network {
    /// The consensus parameters for this network.
    pub fn params(self) -> &'static NetworkParams {
        match self {
            Network::Mainnet => &MAINNET_PARAMS,
            Network::Testnet => &TESTNET_PARAMS,
            Network::Regtest => &REGTEST_PARAMS,
        }
    }
}

/// A BIP9 version-bits deployment.
///
/// The state machine in the consensus layer reads `bit`, `start_time`, and
/// `timeout`; the activation threshold and signalling window are
/// network-wide (`NetworkParams::activation_threshold` / `miner_window`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Deployment {
    /// The name the deployment is looked up by.
    pub name: &'static str,
    /// The version bit miners set to signal readiness.
    pub bit: u8,
    /// The median-time-past after which signalling starts.
    pub start_time: i64,
    /// The median-time-past after which a non-locked-in deployment fails.
    pub timeout: i64,
}

/// The consensus parameters of a single network.
#[derive(Clone, Debug)]
pub struct NetworkParams {
    pub network: Network,
    /// The network magic prefix on wire messages.
    pub magic: [u8; 4],
    pub default_port: u16,
    /// The easiest admissible difficulty, in compact form.
    pub pow_limit_bits: CompactDifficulty,
    /// Blocks per difficulty retarget window.
    pub retarget_interval: u32,
    /// The target duration of a retarget window, in seconds.
    pub target_timespan: i64,
    /// The target block interval, in seconds.
    pub target_spacing: i64,
    /// Never retarget (regtest).
    pub no_retargeting: bool,
    /// Allow a minimum-difficulty block when no block has arrived for twice
    /// the target spacing (testnet's "20-minute rule").
    pub allow_min_difficulty_blocks: bool,
    /// Window for the BIP34/65/66-style super-majority version gates.
    pub majority_window: u32,
    /// Blocks in the window needed before new-version rules are enforced.
    pub majority_enforce_upgrade: u32,
    /// Blocks in the window needed before outdated versions are rejected.
    pub majority_reject_outdated: u32,
    /// Blocks before a coinbase output may be spent.
    pub coinbase_maturity: u32,
    /// Blocks between block-subsidy halvings.
    pub halving_interval: u32,
    /// Signalling blocks needed to lock in a BIP9 deployment.
    pub activation_threshold: u32,
    /// The BIP9 signalling window, in blocks.
    pub miner_window: u32,
    pub deployments: &'static [Deployment],
    /// Known-good `(height, hash)` pairs, in ascending height order.
    checkpoints: &'static [(u32, &'static str)],
    /// Pruning never deletes blocks at or below this height.
    pub prune_after_height: u32,
    /// How many recent blocks pruning keeps, measured in blocks.
    pub keep_blocks: u32,
}

impl NetworkParams {
    /// The checkpoint hash at exactly `height`, if there is one.
    pub fn checkpoint(&self, height: block::Height) -> Option<block::Hash> {
        self.checkpoints
            .iter()
            .find(|(checkpoint_height, _)| *checkpoint_height == height.0)
            .map(|(_, hash)| hash.parse().expect("hard-coded checkpoint hash parses"))
    }

    /// The highest checkpoint, if the network has any.
    pub fn last_checkpoint(&self) -> Option<(block::Height, block::Hash)> {
        self.checkpoints.last().map(|(height, hash)| {
            (
                block::Height(*height),
                hash.parse().expect("hard-coded checkpoint hash parses"),
            )
        })
    }

    /// Look up a deployment by name.
    pub fn deployment(&self, name: &str) -> Option<&'static Deployment> {
        self.deployments
            .iter()
            .find(|deployment| deployment.name == name)
    }
}

const MAINNET_DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        name: "csv",
        bit: 0,
        start_time: 1_462_060_800, // May 1st, 2016
        timeout: 1_493_596_800,    // May 1st, 2017
    },
    Deployment {
        name: "segwit",
        bit: 1,
        start_time: 1_479_168_000, // November 15th, 2016
        timeout: 1_510_704_000,    // November 15th, 2017
    },
];

const TESTNET_DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        name: "csv",
        bit: 0,
        start_time: 1_456_790_400, // March 1st, 2016
        timeout: 1_493_596_800,    // May 1st, 2017
    },
    Deployment {
        name: "segwit",
        bit: 1,
        start_time: 1_462_060_800, // May 1st, 2016
        timeout: 1_493_596_800,    // May 1st, 2017
    },
];

const REGTEST_DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        name: "csv",
        bit: 0,
        start_time: 0,
        timeout: i64::max_value(),
    },
    Deployment {
        name: "segwit",
        bit: 1,
        start_time: 0,
        timeout: i64::max_value(),
    },
];

const MAINNET_CHECKPOINTS: &[(u32, &str)] = &[
    (
        11_111,
        "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d",
    ),
    (
        33_333,
        "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6",
    ),
];

const TESTNET_CHECKPOINTS: &[(u32, &str)] = &[(
    546,
    "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
)];

pub(crate) static MAINNET_PARAMS: NetworkParams = NetworkParams {
    network: Network::Mainnet,
    magic: [0xf9, 0xbe, 0xb4, 0xd9],
    default_port: 8333,
    pow_limit_bits: CompactDifficulty(0x1d00ffff),
    retarget_interval: 2016,
    target_timespan: 14 * 24 * 60 * 60,
    target_spacing: 10 * 60,
    no_retargeting: false,
    allow_min_difficulty_blocks: false,
    majority_window: 1000,
    majority_enforce_upgrade: 750,
    majority_reject_outdated: 950,
    coinbase_maturity: 100,
    activation_threshold: 1916,
    miner_window: 2016,
    halving_interval: 210_000,
    deployments: MAINNET_DEPLOYMENTS,
    checkpoints: MAINNET_CHECKPOINTS,
    prune_after_height: 1000,
    keep_blocks: 288,
};

pub(crate) static TESTNET_PARAMS: NetworkParams = NetworkParams {
    network: Network::Testnet,
    magic: [0x0b, 0x11, 0x09, 0x07],
    default_port: 18333,
    pow_limit_bits: CompactDifficulty(0x1d00ffff),
    retarget_interval: 2016,
    target_timespan: 14 * 24 * 60 * 60,
    target_spacing: 10 * 60,
    no_retargeting: false,
    allow_min_difficulty_blocks: true,
    majority_window: 100,
    majority_enforce_upgrade: 51,
    majority_reject_outdated: 75,
    coinbase_maturity: 100,
    activation_threshold: 1512,
    miner_window: 2016,
    halving_interval: 210_000,
    deployments: TESTNET_DEPLOYMENTS,
    checkpoints: TESTNET_CHECKPOINTS,
    prune_after_height: 1000,
    keep_blocks: 288,
};

pub(crate) static REGTEST_PARAMS: NetworkParams = NetworkParams {
    network: Network::Regtest,
    magic: [0xfa, 0xbf, 0xb5, 0xda],
    default_port: 18444,
    pow_limit_bits: CompactDifficulty(0x207fffff),
    retarget_interval: 2016,
    target_timespan: 14 * 24 * 60 * 60,
    target_spacing: 10 * 60,
    no_retargeting: true,
    allow_min_difficulty_blocks: true,
    majority_window: 1000,
    majority_enforce_upgrade: 750,
    majority_reject_outdated: 950,
    // Regression tests spend coinbases immediately.
    coinbase_maturity: 0,
    activation_threshold: 108,
    miner_window: 144,
    halving_interval: 150,
    deployments: REGTEST_DEPLOYMENTS,
    checkpoints: &[],
    prune_after_height: 1000,
    keep_blocks: 288,
};
