// Registrar for the sample package, resolved as
// `YourDomain\Sample\SampleServiceProvider`.
