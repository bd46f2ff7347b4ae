mod reconcile_tests;
