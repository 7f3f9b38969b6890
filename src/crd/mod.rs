pub mod analysis_run;
