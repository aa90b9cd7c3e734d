pub mod channel_datapath;
