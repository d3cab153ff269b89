//! ABI bindings for the liquid staking contracts

use alloy::sol;

// -------
// | ABI |
// -------

sol! {
    #[sol(rpc)]
    contract Nimbus {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Deposited(address indexed sender, uint256 amount);
        event Redeemed(address indexed receiver, uint256 amount);
        event Rewards(address ledger, uint256 rewards, uint256 balance);
        event Losses(address ledger, uint256 losses, uint256 balance);

        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function bufferedDeposits() external view returns (uint256);
        function bufferedRedeems() external view returns (uint256);
        function getLedgerAddresses() external view returns (address[]);
        function ledgerBorrow(address ledger) external view returns (uint256);
        function ledgerStake(address ledger) external view returns (uint256);
        function getStashAccounts() external view returns (bytes32[]);
        function findLedger(bytes32 stash) external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    contract Ledger {
        function totalBalance() external view returns (uint256);
        function lockedBalance() external view returns (uint256);
        function activeBalance() external view returns (uint256);
        function status() external view returns (uint8);
        function transferUpwardBalance() external view returns (uint256);
        function transferDownwardBalance() external view returns (uint256);
        function cachedTotalBalance() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    contract OracleMaster {
        function MAX_MEMBERS() external view returns (uint256);
        function members(uint256 index) external view returns (address);
        function ANCHOR_ERA_ID() external view returns (uint64);
        function ANCHOR_TIMESTAMP() external view returns (uint64);
        function SECONDS_PER_ERA() external view returns (uint64);
        function getCurrentEraId() external view returns (uint64);
        function eraId() external view returns (uint64);
        function getStashAccounts() external view returns (bytes32[]);
    }
}

sol! {
    #[sol(rpc)]
    contract Withdrawal {
        function pendingForClaiming() external view returns (uint256);
        function totalVirtualXcTokenAmount() external view returns (uint256);
        function totalXcTokenPoolShares() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    contract XcToken {
        function balanceOf(address account) external view returns (uint256);
    }
}
