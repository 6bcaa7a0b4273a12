//! ERC-20 bindings used by the allowance manager and balance reader.

use alloy_sol_types::sol;

sol! {
	interface IERC20 {
		function allowance(address owner, address spender) external view returns (uint256);
		function approve(address spender, uint256 amount) external returns (bool);
		function balanceOf(address account) external view returns (uint256);
		function decimals() external view returns (uint8);
		function symbol() external view returns (string);
	}
}
