pub mod mock_obs;
